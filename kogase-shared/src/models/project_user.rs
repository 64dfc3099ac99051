/// Project membership (non-owner access)
///
/// A membership row grants a user access to a project they do not own. There is
/// at most one row per (project, user) pair; adding an existing member again
/// changes their role.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE project_role AS ENUM ('contributor', 'admin');
///
/// CREATE TABLE project_users (
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role project_role NOT NULL DEFAULT 'contributor',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (project_id, user_id)
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Role of a member within one project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "project_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProjectRole {
    /// Read access: project details, key, analytics
    Contributor,

    /// Contributor plus renaming, key rotation and member management
    Admin,
}

impl ProjectRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectRole::Contributor => "contributor",
            ProjectRole::Admin => "admin",
        }
    }

    /// Whether this member may change project settings
    pub fn can_manage(&self) -> bool {
        matches!(self, ProjectRole::Admin)
    }
}

/// A membership row joined with the member's public profile
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProjectMember {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
    pub role: ProjectRole,
    pub created_at: DateTime<Utc>,
}

/// Membership queries
pub struct ProjectUser;

impl ProjectUser {
    /// Adds a member, or changes the role of an existing one
    pub async fn upsert(
        pool: &PgPool,
        project_id: Uuid,
        user_id: Uuid,
        role: ProjectRole,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO project_users (project_id, user_id, role)
            VALUES ($1, $2, $3)
            ON CONFLICT (project_id, user_id)
            DO UPDATE SET role = EXCLUDED.role, updated_at = NOW()
            "#,
        )
        .bind(project_id)
        .bind(user_id)
        .bind(role)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Role of `user_id` in `project_id`, if they are a member
    pub async fn find_role(
        pool: &PgPool,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectRole>, sqlx::Error> {
        sqlx::query_scalar::<_, ProjectRole>(
            "SELECT role FROM project_users WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// Live members of a project, oldest first
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: Uuid,
    ) -> Result<Vec<ProjectMember>, sqlx::Error> {
        sqlx::query_as::<_, ProjectMember>(
            r#"
            SELECT pu.project_id, pu.user_id, u.email, u.name, pu.role, pu.created_at
            FROM project_users pu
            JOIN users u ON u.id = pu.user_id AND u.deleted_at IS NULL
            WHERE pu.project_id = $1
            ORDER BY pu.created_at ASC
            "#,
        )
        .bind(project_id)
        .fetch_all(pool)
        .await
    }

    /// Removes a member; false if they were not one
    pub async fn delete(pool: &PgPool, project_id: Uuid, user_id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM project_users WHERE project_id = $1 AND user_id = $2")
            .bind(project_id)
            .bind(user_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
