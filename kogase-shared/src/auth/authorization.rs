/// Project access control
///
/// Decides whether a [`Principal`] may act on a project. The decision itself is
/// the pure function [`evaluate`]; [`authorize`] loads what it needs through an
/// [`AccessStore`] and turns the outcome into a `Result`.
///
/// # Rules
///
/// For a **project principal** (API key): `View` on its own project, nothing else.
///
/// For a **user principal**, first match wins:
///
/// 1. System role `admin`: everything.
/// 2. Project owner: everything.
/// 3. Member (a `project_users` row):
///    - `contributor`: `View`
///    - `admin`: `View` and `Manage`
/// 4. Otherwise: denied.
///
/// `Delete` is reserved for the owner and system admins.
///
/// # Not found vs. forbidden
///
/// The project row is loaded before any membership check. An unknown (or
/// deleted) project is [`AuthzError::ProjectNotFound`]; a known project the
/// principal may not touch is [`AuthzError::Forbidden`].
///
/// # Example
///
/// ```no_run
/// use kogase_shared::auth::authorization::{authorize, Permission};
/// use kogase_shared::auth::middleware::Principal;
/// # use sqlx::PgPool;
/// # use uuid::Uuid;
///
/// # async fn example(pool: PgPool, principal: Principal, project_id: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let project = authorize(&pool, &principal, project_id, Permission::View).await?;
/// println!("access granted to {}", project.name);
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::middleware::{Principal, UserPrincipal};
use crate::models::{
    project::Project,
    project_user::{ProjectRole, ProjectUser},
};

/// What the caller wants to do with a project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    /// Read the project, its key, its members and its analytics
    View,

    /// Rename, rotate the key, add or remove members
    Manage,

    /// Delete the project
    Delete,
}

/// Why access was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// API key of a different project
    ForeignProject,

    /// Neither owner nor member
    NotMember,

    /// Member, but the role does not cover the permission
    InsufficientRole,
}

impl DenyReason {
    pub fn message(&self) -> &'static str {
        match self {
            DenyReason::ForeignProject => "API key does not grant access to this project",
            DenyReason::NotMember => "Access denied",
            DenyReason::InsufficientRole => "Insufficient permissions for this project",
        }
    }
}

/// Outcome of [`evaluate`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow)
    }
}

/// Error type for authorization checks
#[derive(Debug, thiserror::Error)]
pub enum AuthzError {
    #[error("Project {0} not found")]
    ProjectNotFound(Uuid),

    #[error("{}", .0.message())]
    Forbidden(DenyReason),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Applies the access rules to already-loaded facts
///
/// `membership` is the user's `project_users` role, if any; it is ignored for
/// project principals.
pub fn evaluate(
    principal: &Principal,
    project: &Project,
    membership: Option<ProjectRole>,
    permission: Permission,
) -> AccessDecision {
    match principal {
        Principal::Project { project_id } => {
            if *project_id != project.id {
                AccessDecision::Deny(DenyReason::ForeignProject)
            } else if permission == Permission::View {
                AccessDecision::Allow
            } else {
                AccessDecision::Deny(DenyReason::InsufficientRole)
            }
        }
        Principal::User(user) => {
            if user.is_admin() || project.owner_id == user.user_id {
                return AccessDecision::Allow;
            }

            match (membership, permission) {
                (None, _) => AccessDecision::Deny(DenyReason::NotMember),
                (Some(_), Permission::View) => AccessDecision::Allow,
                (Some(role), Permission::Manage) if role.can_manage() => AccessDecision::Allow,
                (Some(_), _) => AccessDecision::Deny(DenyReason::InsufficientRole),
            }
        }
    }
}

/// Storage needed to make access decisions
#[async_trait]
pub trait AccessStore: Send + Sync {
    /// Live project by ID
    async fn find_project(&self, project_id: Uuid) -> Result<Option<Project>, sqlx::Error>;

    /// Membership role of a user in a project
    async fn membership_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectRole>, sqlx::Error>;
}

#[async_trait]
impl AccessStore for PgPool {
    async fn find_project(&self, project_id: Uuid) -> Result<Option<Project>, sqlx::Error> {
        Project::find_by_id(self, project_id).await
    }

    async fn membership_role(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectRole>, sqlx::Error> {
        ProjectUser::find_role(self, project_id, user_id).await
    }
}

/// Loads the project and checks `permission` on it
///
/// Returns the project on success so callers need not load it again.
pub async fn authorize<S>(
    store: &S,
    principal: &Principal,
    project_id: Uuid,
    permission: Permission,
) -> Result<Project, AuthzError>
where
    S: AccessStore + ?Sized,
{
    let project = store
        .find_project(project_id)
        .await?
        .ok_or(AuthzError::ProjectNotFound(project_id))?;

    // Membership only matters for users who are neither admin nor owner
    let membership = match principal {
        Principal::User(user) if !user.is_admin() && project.owner_id != user.user_id => {
            store.membership_role(project.id, user.user_id).await?
        }
        _ => None,
    };

    match evaluate(principal, &project, membership, permission) {
        AccessDecision::Allow => Ok(project),
        AccessDecision::Deny(reason) => {
            tracing::debug!(project_id = %project_id, ?reason, ?permission, "Project access denied");
            Err(AuthzError::Forbidden(reason))
        }
    }
}

/// Projects visible to a user when no single project is targeted
///
/// Admins see every live project; everyone else sees owned projects plus
/// projects they are a member of.
pub async fn accessible_projects(
    pool: &PgPool,
    user: &UserPrincipal,
) -> Result<Vec<Project>, sqlx::Error> {
    if user.is_admin() {
        Project::list_all(pool).await
    } else {
        Project::list_accessible(pool, user.user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;
    use chrono::Utc;

    fn project(owner_id: Uuid) -> Project {
        Project {
            id: Uuid::new_v4(),
            name: "Game1".to_string(),
            api_key: "kg_test".to_string(),
            owner_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn user(role: UserRole) -> (Uuid, Principal) {
        let user_id = Uuid::new_v4();
        (
            user_id,
            Principal::User(UserPrincipal {
                user_id,
                role,
                token_id: Uuid::new_v4(),
            }),
        )
    }

    const ALL: [Permission; 3] = [Permission::View, Permission::Manage, Permission::Delete];

    #[test]
    fn test_admin_allowed_everything() {
        let (_, admin) = user(UserRole::Admin);
        let p = project(Uuid::new_v4());
        for permission in ALL {
            assert!(evaluate(&admin, &p, None, permission).is_allowed());
        }
    }

    #[test]
    fn test_owner_allowed_everything() {
        let (owner_id, owner) = user(UserRole::Developer);
        let p = project(owner_id);
        for permission in ALL {
            assert!(evaluate(&owner, &p, None, permission).is_allowed());
        }
    }

    #[test]
    fn test_stranger_denied() {
        let (_, stranger) = user(UserRole::Developer);
        let p = project(Uuid::new_v4());
        for permission in ALL {
            assert_eq!(
                evaluate(&stranger, &p, None, permission),
                AccessDecision::Deny(DenyReason::NotMember)
            );
        }
    }

    #[test]
    fn test_contributor_can_only_view() {
        let (_, member) = user(UserRole::Developer);
        let p = project(Uuid::new_v4());
        let role = Some(ProjectRole::Contributor);

        assert!(evaluate(&member, &p, role, Permission::View).is_allowed());
        assert_eq!(
            evaluate(&member, &p, role, Permission::Manage),
            AccessDecision::Deny(DenyReason::InsufficientRole)
        );
        assert_eq!(
            evaluate(&member, &p, role, Permission::Delete),
            AccessDecision::Deny(DenyReason::InsufficientRole)
        );
    }

    #[test]
    fn test_project_admin_can_manage_but_not_delete() {
        let (_, member) = user(UserRole::Developer);
        let p = project(Uuid::new_v4());
        let role = Some(ProjectRole::Admin);

        assert!(evaluate(&member, &p, role, Permission::View).is_allowed());
        assert!(evaluate(&member, &p, role, Permission::Manage).is_allowed());
        assert!(!evaluate(&member, &p, role, Permission::Delete).is_allowed());
    }

    #[test]
    fn test_project_principal_scoped_to_own_project() {
        let p = project(Uuid::new_v4());
        let own = Principal::Project { project_id: p.id };
        let foreign = Principal::Project {
            project_id: Uuid::new_v4(),
        };

        assert!(evaluate(&own, &p, None, Permission::View).is_allowed());
        assert!(!evaluate(&own, &p, None, Permission::Manage).is_allowed());
        assert_eq!(
            evaluate(&foreign, &p, None, Permission::View),
            AccessDecision::Deny(DenyReason::ForeignProject)
        );
    }

    #[test]
    fn test_project_principal_ignores_membership() {
        let p = project(Uuid::new_v4());
        let foreign = Principal::Project {
            project_id: Uuid::new_v4(),
        };
        assert!(!evaluate(&foreign, &p, Some(ProjectRole::Admin), Permission::View).is_allowed());
    }
}
