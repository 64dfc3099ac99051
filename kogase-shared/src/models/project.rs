/// Project model: the tenant boundary
///
/// Every device, event and metric belongs to exactly one project. SDK clients
/// authenticate as a project by presenting its API key, which is unique across
/// all projects and generated by the server (see [`crate::auth::api_key`]).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE projects (
///     id UUID PRIMARY KEY,
///     name VARCHAR(255) NOT NULL,
///     api_key VARCHAR(64) NOT NULL UNIQUE,
///     owner_id UUID NOT NULL REFERENCES users(id),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     deleted_at TIMESTAMPTZ
/// );
/// ```
///
/// # Key rotation
///
/// [`Project::regenerate_api_key`] swaps the key with a single `UPDATE`. Readers see
/// either the old key or the new one, never both and never neither, and the old
/// key stops resolving as soon as the statement commits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::api_key::generate_api_key;

/// A project
///
/// The API key is skipped when serializing; it is only handed out by the
/// dedicated key endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Project {
    pub id: Uuid,

    pub name: String,

    #[serde(skip_serializing, default)]
    pub api_key: String,

    pub owner_id: Uuid,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Input for creating a project
#[derive(Debug, Clone)]
pub struct CreateProject {
    pub name: String,
    pub owner_id: Uuid,
}

const PROJECT_COLUMNS: &str = "id, name, api_key, owner_id, created_at, updated_at, deleted_at";

impl Project {
    /// Creates a project owned by `data.owner_id` with a fresh API key
    pub async fn create(pool: &PgPool, data: CreateProject) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO projects (id, name, api_key, owner_id)
             VALUES ($1, $2, $3, $4)
             RETURNING {}",
            PROJECT_COLUMNS
        );

        sqlx::query_as::<_, Project>(&query)
            .bind(Uuid::new_v4())
            .bind(data.name)
            .bind(generate_api_key())
            .bind(data.owner_id)
            .fetch_one(pool)
            .await
    }

    /// Finds a live project by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM projects WHERE id = $1 AND deleted_at IS NULL",
            PROJECT_COLUMNS
        );

        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Resolves an API key to its live project (exact match)
    pub async fn find_by_api_key(pool: &PgPool, api_key: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM projects WHERE api_key = $1 AND deleted_at IS NULL",
            PROJECT_COLUMNS
        );

        sqlx::query_as::<_, Project>(&query)
            .bind(api_key)
            .fetch_optional(pool)
            .await
    }

    /// Every live project, newest first
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM projects WHERE deleted_at IS NULL ORDER BY created_at DESC",
            PROJECT_COLUMNS
        );

        sqlx::query_as::<_, Project>(&query).fetch_all(pool).await
    }

    /// Live projects the user owns or is a member of, newest first
    pub async fn list_accessible(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {} FROM projects p
             WHERE p.deleted_at IS NULL
               AND (p.owner_id = $1
                    OR EXISTS (SELECT 1 FROM project_users pu
                               WHERE pu.project_id = p.id AND pu.user_id = $1))
             ORDER BY p.created_at DESC",
            PROJECT_COLUMNS
        );

        sqlx::query_as::<_, Project>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }

    /// Renames a live project; `None` if it does not exist
    pub async fn update_name(
        pool: &PgPool,
        id: Uuid,
        name: &str,
    ) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE projects SET name = $2, updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {}",
            PROJECT_COLUMNS
        );

        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// Replaces the API key and returns the updated project
    pub async fn regenerate_api_key(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "UPDATE projects SET api_key = $2, updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL
             RETURNING {}",
            PROJECT_COLUMNS
        );

        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .bind(generate_api_key())
            .fetch_optional(pool)
            .await
    }

    /// Marks the project deleted; its key stops resolving immediately
    pub async fn soft_delete(pool: &PgPool, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE projects SET deleted_at = NOW(), updated_at = NOW()
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_serialization_hides_api_key() {
        let project = Project {
            id: Uuid::new_v4(),
            name: "Game1".to_string(),
            api_key: "kg_secret".to_string(),
            owner_id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };

        let json = serde_json::to_value(&project).unwrap();
        assert!(json.get("api_key").is_none());
        assert_eq!(json["name"], "Game1");
    }
}
