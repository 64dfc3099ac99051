/// JWT issuance and validation for dashboard sessions
///
/// Tokens are HS256-signed and carry the user's id, email and role. A valid
/// signature is necessary but not sufficient: the token must also still have a
/// live row in `auth_tokens` (see [`crate::auth::middleware::authenticate_bearer`]).
///
/// # Claims
///
/// - `sub`: user ID
/// - `email`, `role`: informational copies taken at login
/// - `iss`: always `"kogase"`
/// - `iat`, `nbf`, `exp`: Unix timestamps
/// - `jti`: random, so two logins in the same second still get distinct tokens
///
/// # Example
///
/// ```
/// use chrono::Duration;
/// use kogase_shared::auth::jwt::{issue_token, validate_token};
/// use kogase_shared::models::user::UserRole;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let secret = "a-secret-that-is-at-least-32-bytes-long";
/// let user_id = Uuid::new_v4();
///
/// let issued = issue_token(user_id, "a@x.com", UserRole::Developer, secret, Duration::hours(24))?;
/// let claims = validate_token(&issued.token, secret)?;
/// assert_eq!(claims.sub, user_id);
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::user::UserRole;

/// Issuer written into and required from every token
pub const ISSUER: &str = "kogase";

/// Error type for JWT operations
#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Failed to create token: {0}")]
    CreateError(String),

    #[error("Invalid token: {0}")]
    ValidationError(String),

    #[error("Token has expired")]
    Expired,

    #[error("Invalid token issuer")]
    InvalidIssuer,
}

/// Session token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: UserRole,
    pub iss: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: Uuid,
}

/// A signed token together with its expiry
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Signs a session token valid for `ttl`
pub fn issue_token(
    user_id: Uuid,
    email: &str,
    role: UserRole,
    secret: &str,
    ttl: Duration,
) -> Result<IssuedToken, JwtError> {
    let now = Utc::now();
    let expires_at = now + ttl;

    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        role,
        iss: ISSUER.to_string(),
        iat: now.timestamp(),
        nbf: now.timestamp(),
        exp: expires_at.timestamp(),
        jti: Uuid::new_v4(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::CreateError(e.to_string()))?;

    // Truncate to whole seconds so the stored expiry matches the `exp` claim
    let expires_at = Utc
        .timestamp_opt(claims.exp, 0)
        .single()
        .ok_or_else(|| JwtError::CreateError("expiry out of range".to_string()))?;

    Ok(IssuedToken { token, expires_at })
}

/// Verifies signature, issuer, `nbf` and `exp`, returning the claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_issuer(&[ISSUER]);
    validation.validate_exp = true;
    validation.validate_nbf = true;

    decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::Expired,
            ErrorKind::InvalidIssuer => JwtError::InvalidIssuer,
            _ => JwtError::ValidationError(e.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_issue_and_validate() {
        let user_id = Uuid::new_v4();
        let issued = issue_token(user_id, "a@x.com", UserRole::Admin, SECRET, Duration::hours(1)).unwrap();

        let claims = validate_token(&issued.token, SECRET).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "a@x.com");
        assert_eq!(claims.role, UserRole::Admin);
        assert_eq!(claims.iss, ISSUER);
        assert_eq!(claims.exp, issued.expires_at.timestamp());
    }

    #[test]
    fn test_tokens_are_unique_per_issue() {
        let user_id = Uuid::new_v4();
        let a = issue_token(user_id, "a@x.com", UserRole::Developer, SECRET, Duration::hours(1)).unwrap();
        let b = issue_token(user_id, "a@x.com", UserRole::Developer, SECRET, Duration::hours(1)).unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issued =
            issue_token(Uuid::new_v4(), "a@x.com", UserRole::Developer, SECRET, Duration::hours(1)).unwrap();

        let result = validate_token(&issued.token, "another-secret-key-at-least-32-bytes");
        assert!(matches!(result, Err(JwtError::ValidationError(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        // Well past the default 60s leeway
        let issued = issue_token(
            Uuid::new_v4(),
            "a@x.com",
            UserRole::Developer,
            SECRET,
            Duration::hours(-2),
        )
        .unwrap();

        let result = validate_token(&issued.token, SECRET);
        assert!(matches!(result, Err(JwtError::Expired)));
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "a@x.com".to_string(),
            role: UserRole::Developer,
            iss: "someone-else".to_string(),
            iat: now,
            nbf: now,
            exp: now + 3600,
            jti: Uuid::new_v4(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(validate_token(&token, SECRET), Err(JwtError::InvalidIssuer)));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(validate_token("not.a.jwt", SECRET).is_err());
    }
}
