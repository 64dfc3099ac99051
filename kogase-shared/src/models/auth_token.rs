/// Persisted session tokens
///
/// Every JWT issued at login gets a row here, keyed by the SHA-256 of the token.
/// A bearer token authenticates only while its row is live and unexpired, which
/// is what makes logout and account deletion take effect before the JWT's own
/// `exp` claim runs out.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE auth_tokens (
///     id UUID PRIMARY KEY,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     token_hash CHAR(64) NOT NULL UNIQUE,
///     expires_at TIMESTAMPTZ NOT NULL,
///     last_used_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     deleted_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use super::user::UserRole;

/// Hex SHA-256 of a raw token, as stored in `token_hash`
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// A live token row joined with its owner's current role
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActiveToken {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub role: UserRole,
    pub expires_at: DateTime<Utc>,
}

/// Token queries
pub struct AuthToken;

impl AuthToken {
    /// Records a freshly issued token
    pub async fn create(
        pool: &PgPool,
        user_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO auth_tokens (id, user_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(hash_token(token))
        .bind(expires_at)
        .fetch_one(pool)
        .await
    }

    /// Looks up a token that is live, unexpired and owned by a live user
    pub async fn find_active(pool: &PgPool, token: &str) -> Result<Option<ActiveToken>, sqlx::Error> {
        sqlx::query_as::<_, ActiveToken>(
            r#"
            SELECT t.id AS token_id, t.user_id, u.role, t.expires_at
            FROM auth_tokens t
            JOIN users u ON u.id = t.user_id AND u.deleted_at IS NULL
            WHERE t.token_hash = $1
              AND t.deleted_at IS NULL
              AND t.expires_at > NOW()
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(pool)
        .await
    }

    /// Bumps `last_used_at`
    pub async fn touch_last_used(pool: &PgPool, token_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE auth_tokens SET last_used_at = NOW() WHERE id = $1")
            .bind(token_id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Revokes a single token; false if it was already gone
    pub async fn revoke(pool: &PgPool, token_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE auth_tokens SET deleted_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(token_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Revokes every live token of a user, returning how many were revoked
    pub async fn revoke_all_for_user(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE auth_tokens SET deleted_at = NOW(), updated_at = NOW()
             WHERE user_id = $1 AND deleted_at IS NULL",
        )
        .bind(user_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_token_is_stable_hex() {
        let a = hash_token("eyJ.header.sig");
        let b = hash_token("eyJ.header.sig");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, hash_token("eyJ.header.sih"));
    }
}
