/// Authentication endpoints
///
/// - `POST /api/v1/auth/register` - Register new user
/// - `POST /api/v1/auth/login` - Login and get a session token
/// - `POST /api/v1/auth/logout` - Revoke the current session token
///   (also mounted at `/api/v1/dashboard/user/logout`)
///
/// Session tokens are JWTs whose SHA-256 digest is recorded in `auth_tokens`;
/// logging out revokes that row, so a token stops working before it expires.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ApiJson, CurrentUser},
    routes::not_blank,
};
use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use kogase_shared::{
    auth::{jwt, password},
    models::{
        auth_token::AuthToken,
        user::{CreateUser, User, UserRole},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password, at least 6 characters
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,

    /// Display name
    #[validate(
        custom(function = "not_blank"),
        length(min = 1, max = 100, message = "Name must be 1 to 100 characters")
    )]
    pub name: String,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    /// Email address
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Public profile returned with a session
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: UserRole,
}

/// Login response
#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    /// Bearer token for dashboard endpoints
    pub token: String,

    pub expires_at: DateTime<Utc>,

    pub user: SessionUser,
}

/// Plain acknowledgement body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Register a new user
///
/// # Endpoint
///
/// ```text
/// POST /api/v1/auth/register
/// Content-Type: application/json
///
/// {
///   "email": "a@x.com",
///   "password": "secret1",
///   "name": "Ada"
/// }
/// ```
///
/// # Response
///
/// `201 Created` with the user (no password hash). New users always get the
/// `developer` role.
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed
/// - `409 Conflict`: Email already in use
pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    req.validate()?;
    password::validate_password(&req.password)?;

    let email = req.email.trim().to_string();

    // Friendlier than waiting for the constraint, which still backs this up
    if User::find_by_email(&state.db, &email).await?.is_some() {
        return Err(ApiError::Conflict("Email already in use".to_string()));
    }

    let password_hash = password::hash_password(&req.password)?;

    let user = User::create(
        &state.db,
        CreateUser {
            email,
            password_hash,
            name: req.name.trim().to_string(),
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "User registered");
    Ok((StatusCode::CREATED, Json(user)))
}

/// Login endpoint
///
/// # Endpoint
///
/// ```text
/// POST /api/v1/auth/login
/// Content-Type: application/json
///
/// {
///   "email": "a@x.com",
///   "password": "secret1"
/// }
/// ```
///
/// # Response
///
/// ```json
/// {
///   "token": "eyJ...",
///   "expires_at": "2025-03-27T12:00:00Z",
///   "user": { "id": "uuid", "email": "a@x.com", "name": "Ada", "role": "developer" }
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Validation failed
/// - `401 Unauthorized`: Invalid credentials
pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    req.validate()?;

    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let user = User::find_by_email(&state.db, req.email.trim())
        .await?
        .ok_or_else(invalid)?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
        return Err(invalid());
    }

    let issued = jwt::issue_token(
        user.id,
        &user.email,
        user.role,
        state.jwt_secret(),
        state.config.token_ttl(),
    )?;

    AuthToken::create(&state.db, user.id, &issued.token, issued.expires_at).await?;

    tracing::info!(user_id = %user.id, "User logged in");
    Ok(Json(LoginResponse {
        token: issued.token,
        expires_at: issued.expires_at,
        user: SessionUser {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
        },
    }))
}

/// Logout endpoint
///
/// Revokes the token that authenticated this request. Other sessions of the
/// same user stay valid.
pub async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<MessageResponse>> {
    AuthToken::revoke(&state.db, user.token_id).await?;

    tracing::info!(user_id = %user.user_id, "User logged out");
    Ok(MessageResponse::new("Logged out successfully"))
}
