/// Access-control resolver against an in-memory store
///
/// Run with: cargo test --test access_control_tests

mod common;

use common::{user_principal, MemoryAccessStore};
use kogase_shared::auth::authorization::{authorize, AuthzError, DenyReason, Permission};
use kogase_shared::auth::middleware::Principal;
use kogase_shared::models::{project_user::ProjectRole, user::UserRole};
use uuid::Uuid;

#[tokio::test]
async fn test_owner_is_allowed() {
    let store = MemoryAccessStore::new();
    let (owner_id, owner) = user_principal(UserRole::Developer);
    let project = store.add_project(owner_id);

    for permission in [Permission::View, Permission::Manage, Permission::Delete] {
        let allowed = authorize(&store, &owner, project.id, permission).await.unwrap();
        assert_eq!(allowed.id, project.id);
    }
}

#[tokio::test]
async fn test_granting_membership_flips_deny_to_allow() {
    let store = MemoryAccessStore::new();
    let project = store.add_project(Uuid::new_v4());
    let (user_id, user) = user_principal(UserRole::Developer);

    let err = authorize(&store, &user, project.id, Permission::View).await.unwrap_err();
    assert!(matches!(err, AuthzError::Forbidden(DenyReason::NotMember)));

    store.grant(project.id, user_id, ProjectRole::Contributor);
    assert!(authorize(&store, &user, project.id, Permission::View).await.is_ok());

    let err = authorize(&store, &user, project.id, Permission::Manage).await.unwrap_err();
    assert!(matches!(err, AuthzError::Forbidden(DenyReason::InsufficientRole)));

    store.grant(project.id, user_id, ProjectRole::Admin);
    assert!(authorize(&store, &user, project.id, Permission::Manage).await.is_ok());
    assert!(authorize(&store, &user, project.id, Permission::Delete).await.is_err());

    store.revoke(project.id, user_id);
    assert!(authorize(&store, &user, project.id, Permission::View).await.is_err());
}

#[tokio::test]
async fn test_system_admin_sees_any_project() {
    let store = MemoryAccessStore::new();
    let project = store.add_project(Uuid::new_v4());
    let (_, admin) = user_principal(UserRole::Admin);

    assert!(authorize(&store, &admin, project.id, Permission::Delete).await.is_ok());
}

#[tokio::test]
async fn test_unknown_project_is_not_found_not_forbidden() {
    let store = MemoryAccessStore::new();
    let (_, user) = user_principal(UserRole::Developer);
    let missing = Uuid::new_v4();

    let err = authorize(&store, &user, missing, Permission::View).await.unwrap_err();
    assert!(matches!(err, AuthzError::ProjectNotFound(id) if id == missing));

    // Even admins get not-found rather than an empty allow
    let (_, admin) = user_principal(UserRole::Admin);
    let err = authorize(&store, &admin, missing, Permission::View).await.unwrap_err();
    assert!(matches!(err, AuthzError::ProjectNotFound(_)));
}

#[tokio::test]
async fn test_soft_deleted_project_is_not_found() {
    let store = MemoryAccessStore::new();
    let (owner_id, owner) = user_principal(UserRole::Developer);
    let project = store.add_project(owner_id);

    store.soft_delete(project.id);

    let err = authorize(&store, &owner, project.id, Permission::View).await.unwrap_err();
    assert!(matches!(err, AuthzError::ProjectNotFound(_)));
}

#[tokio::test]
async fn test_project_principal_only_reads_own_project() {
    let store = MemoryAccessStore::new();
    let own = store.add_project(Uuid::new_v4());
    let other = store.add_project(Uuid::new_v4());
    let principal = Principal::Project { project_id: own.id };

    assert!(authorize(&store, &principal, own.id, Permission::View).await.is_ok());

    let err = authorize(&store, &principal, other.id, Permission::View).await.unwrap_err();
    assert!(matches!(err, AuthzError::Forbidden(DenyReason::ForeignProject)));

    let err = authorize(&store, &principal, own.id, Permission::Manage).await.unwrap_err();
    assert!(matches!(err, AuthzError::Forbidden(_)));
}
