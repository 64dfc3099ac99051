/// Application state and router builder
///
/// This module defines the shared application state and provides
/// a function to build the Axum router with all routes and middleware.
///
/// # Example
///
/// ```no_run
/// use kogase_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = kogase_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{config::Config, error::ApiError};
use axum::{
    extract::{Request, State},
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn_with_state, Next},
    response::Response,
    routing::{delete, get, post},
    Router,
};
use kogase_shared::{
    auth::middleware::{
        api_key_from_headers, authenticate_api_key, authenticate_bearer, bearer_token,
        API_KEY_HEADER,
    },
    ingest::{store::PgIngestStore, IngestPipeline},
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// This is cloned for each request handler via Axum's `State` extractor.
/// Uses Arc internally for cheap cloning.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,

    /// Event ingestion over the same pool
    pub ingest: IngestPipeline,
}

impl AppState {
    /// Creates new application state
    pub fn new(db: PgPool, config: Config) -> Self {
        let ingest = IngestPipeline::new(Arc::new(PgIngestStore::new(db.clone())));
        Self {
            db,
            config: Arc::new(config),
            ingest,
        }
    }

    /// Gets JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Architecture
///
/// ```text
/// /api/v1
/// ├── GET  /health                               public
/// ├── /auth
/// │   ├── POST /register                         public
/// │   ├── POST /login                            public
/// │   └── POST /logout                           bearer
/// ├── /sdk                                       API key
/// │   ├── POST /event
/// │   ├── POST /events
/// │   ├── POST /session/start
/// │   ├── POST /session/end
/// │   ├── POST /install
/// │   └── POST /installation
/// └── /dashboard
///     ├── /user/me            GET PUT DELETE     bearer
///     ├── /user/logout        POST               bearer
///     ├── /projects           GET POST           bearer
///     │   └── /:id            GET PUT DELETE
///     │       ├── /api-key    GET
///     │       ├── /api-key/regenerate   POST
///     │       └── /members    GET POST, /:user_id DELETE
///     └── /analytics                             bearer or API key
///         ├── GET /metrics
///         ├── GET /events
///         └── GET /devices
/// ```
///
/// # Middleware Stack
///
/// Applied in order (bottom to top):
/// 1. Logging (tower-http TraceLayer)
/// 2. CORS (tower-http CorsLayer)
/// 3. Authentication (per route group)
pub fn build_router(state: AppState) -> Router {
    use crate::routes;

    let public_auth_routes = Router::new()
        .route("/register", post(routes::auth::register))
        .route("/login", post(routes::auth::login));

    let session_auth_routes = Router::new()
        .route("/logout", post(routes::auth::logout))
        .layer(from_fn_with_state(state.clone(), user_auth_layer));

    let sdk_routes = Router::new()
        .route("/event", post(routes::telemetry::record_event))
        .route("/events", post(routes::telemetry::record_events))
        .route("/session/start", post(routes::telemetry::start_session))
        .route("/session/end", post(routes::telemetry::end_session))
        .route("/install", post(routes::telemetry::record_install))
        .route("/installation", post(routes::telemetry::record_installation))
        .layer(from_fn_with_state(state.clone(), api_key_auth_layer));

    let user_routes = Router::new()
        .route(
            "/me",
            get(routes::users::me)
                .put(routes::users::update_me)
                .delete(routes::users::delete_me),
        )
        .route("/logout", post(routes::auth::logout));

    let project_routes = Router::new()
        .route(
            "/",
            get(routes::projects::list_projects).post(routes::projects::create_project),
        )
        .route(
            "/:id",
            get(routes::projects::get_project)
                .put(routes::projects::update_project)
                .delete(routes::projects::delete_project),
        )
        .route("/:id/api-key", get(routes::projects::get_api_key))
        .route(
            "/:id/api-key/regenerate",
            post(routes::projects::regenerate_api_key),
        )
        .route(
            "/:id/members",
            get(routes::projects::list_members).post(routes::projects::add_member),
        )
        .route(
            "/:id/members/:user_id",
            delete(routes::projects::remove_member),
        );

    let user_dashboard_routes = Router::new()
        .nest("/user", user_routes)
        .nest("/projects", project_routes)
        .layer(from_fn_with_state(state.clone(), user_auth_layer));

    let analytics_routes = Router::new()
        .route("/metrics", get(routes::analytics::get_metrics))
        .route("/events", get(routes::analytics::get_events))
        .route("/devices", get(routes::analytics::get_devices))
        .layer(from_fn_with_state(state.clone(), any_auth_layer));

    let v1_routes = Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/auth", public_auth_routes.merge(session_auth_routes))
        .nest("/sdk", sdk_routes)
        .nest(
            "/dashboard",
            user_dashboard_routes.nest("/analytics", analytics_routes),
        );

    Router::new()
        .nest("/api/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.api.cors_origins.iter().any(|o| o == "*") {
        // Development mode: permissive CORS
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-kogase-api-key"),
        ])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Session authentication middleware layer
///
/// Validates the bearer token against its signature and the `auth_tokens`
/// table, then injects the user principal into request extensions.
async fn user_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(req.headers())?;
    let principal = authenticate_bearer(&state.db, state.jwt_secret(), token).await?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// API key authentication middleware layer
async fn api_key_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = api_key_from_headers(req.headers())?;
    let principal = authenticate_api_key(&state.db, key).await?;

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}

/// Accepts either credential; the API key wins when its header is present
async fn any_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = if req.headers().contains_key(API_KEY_HEADER) {
        let key = api_key_from_headers(req.headers())?;
        authenticate_api_key(&state.db, key).await?
    } else {
        let token = bearer_token(req.headers())?;
        authenticate_bearer(&state.db, state.jwt_secret(), token).await?
    };

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
