/// Request authentication: credentials in, [`Principal`] out
///
/// Two kinds of credentials are accepted:
///
/// - **Bearer token** (`Authorization: Bearer <jwt>`) for dashboard users. The JWT
///   must verify *and* have a live, unexpired row in `auth_tokens`.
/// - **API key** (`X-Kogase-API-Key: <key>`) for SDK clients. The key must match a
///   live project exactly.
///
/// The server's middleware layers call [`authenticate_bearer`] or
/// [`authenticate_api_key`] once per request and insert the resulting
/// [`Principal`] into the request extensions; handlers and the access-control
/// resolver take it from there.
///
/// # Example
///
/// ```no_run
/// use axum::http::HeaderMap;
/// use kogase_shared::auth::middleware::{authenticate_api_key, api_key_from_headers, Principal};
/// # use sqlx::PgPool;
///
/// # async fn example(pool: PgPool, headers: HeaderMap) -> Result<(), Box<dyn std::error::Error>> {
/// let key = api_key_from_headers(&headers)?;
/// let principal = authenticate_api_key(&pool, key).await?;
/// assert!(matches!(principal, Principal::Project { .. }));
/// # Ok(())
/// # }
/// ```

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::api_key::validate_api_key_format;
use super::jwt::{validate_token, JwtError};
use crate::models::{auth_token::AuthToken, project::Project, user::UserRole};

/// Header carrying a project API key
pub const API_KEY_HEADER: &str = "X-Kogase-API-Key";

/// A dashboard user resolved from a session token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPrincipal {
    pub user_id: Uuid,

    /// Current role from the users table, not the copy in the JWT
    pub role: UserRole,

    /// The `auth_tokens` row that authenticated this request
    pub token_id: Uuid,
}

impl UserPrincipal {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// The authenticated identity attached to a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Principal {
    /// An SDK client holding a project's API key; scoped to that project only
    Project { project_id: Uuid },

    /// A logged-in dashboard user
    User(UserPrincipal),
}

impl Principal {
    pub fn as_user(&self) -> Option<&UserPrincipal> {
        match self {
            Principal::User(user) => Some(user),
            Principal::Project { .. } => None,
        }
    }

    pub fn project_id(&self) -> Option<Uuid> {
        match self {
            Principal::Project { project_id } => Some(*project_id),
            Principal::User(_) => None,
        }
    }
}

/// Credential failures
///
/// Everything except a storage failure is a 401; callers cannot tell a missing
/// token from a revoked one.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing credentials")]
    MissingCredentials,

    #[error("{0}")]
    InvalidFormat(String),

    #[error("{0}")]
    InvalidToken(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

impl AuthError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            AuthError::DatabaseError(e) => {
                tracing::error!(error = %e, "Credential lookup failed");
                serde_json::json!({
                    "error": "internal_error",
                    "message": "An internal error occurred",
                })
            }
            other => serde_json::json!({
                "error": "unauthorized",
                "message": other.to_string(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

/// Extracts the raw token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingCredentials)?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AuthError::InvalidFormat("Expected Bearer token".to_string()))
}

/// Extracts the raw key from the API key header
pub fn api_key_from_headers(headers: &HeaderMap) -> Result<&str, AuthError> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or(AuthError::MissingCredentials)
}

/// Resolves a session token to a user principal
///
/// Updating `last_used_at` is best-effort: a failure there is logged and the
/// request still succeeds.
pub async fn authenticate_bearer(
    pool: &PgPool,
    secret: &str,
    token: &str,
) -> Result<Principal, AuthError> {
    let claims = validate_token(token, secret).map_err(|e| match e {
        JwtError::Expired => AuthError::InvalidToken("Token expired".to_string()),
        _ => AuthError::InvalidToken("Invalid token".to_string()),
    })?;

    let active = AuthToken::find_active(pool, token)
        .await?
        .ok_or_else(|| AuthError::InvalidToken("Token revoked or expired".to_string()))?;

    if active.user_id != claims.sub {
        return Err(AuthError::InvalidToken("Invalid token".to_string()));
    }

    if let Err(e) = AuthToken::touch_last_used(pool, active.token_id).await {
        tracing::warn!(error = %e, token_id = %active.token_id, "Failed to update token last_used_at");
    }

    Ok(Principal::User(UserPrincipal {
        user_id: active.user_id,
        role: active.role,
        token_id: active.token_id,
    }))
}

/// Resolves an API key to its project principal
pub async fn authenticate_api_key(pool: &PgPool, key: &str) -> Result<Principal, AuthError> {
    if !validate_api_key_format(key) {
        return Err(AuthError::InvalidApiKey);
    }

    let project = Project::find_by_api_key(pool, key)
        .await?
        .ok_or(AuthError::InvalidApiKey)?;

    Ok(Principal::Project {
        project_id: project.id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(matches!(bearer_token(&headers), Err(AuthError::MissingCredentials)));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(matches!(bearer_token(&headers), Err(AuthError::InvalidFormat(_))));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert!(matches!(bearer_token(&headers), Err(AuthError::InvalidFormat(_))));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).unwrap(), "abc.def.ghi");
    }

    #[test]
    fn test_api_key_extraction() {
        let mut headers = HeaderMap::new();
        assert!(api_key_from_headers(&headers).is_err());

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("kg_abc"));
        assert_eq!(api_key_from_headers(&headers).unwrap(), "kg_abc");
    }

    #[test]
    fn test_auth_errors_are_unauthorized() {
        assert_eq!(AuthError::MissingCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::InvalidFormat("x".to_string()).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AuthError::InvalidApiKey.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::DatabaseError(sqlx::Error::PoolTimedOut).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_principal_accessors() {
        let project_id = Uuid::new_v4();
        let project = Principal::Project { project_id };
        assert_eq!(project.project_id(), Some(project_id));
        assert!(project.as_user().is_none());

        let user = Principal::User(UserPrincipal {
            user_id: Uuid::new_v4(),
            role: UserRole::Admin,
            token_id: Uuid::new_v4(),
        });
        assert!(user.as_user().map(|u| u.is_admin()).unwrap_or(false));
        assert_eq!(user.project_id(), None);
    }
}
