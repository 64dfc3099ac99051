/// Project management endpoints
///
/// Every route that names a project goes through
/// [`authorize`](kogase_shared::auth::authorization::authorize) first, so an
/// unknown project is a 404 and a project the caller may not touch is a 403.
///
/// | Route | Permission |
/// |---|---|
/// | `GET /projects`, `POST /projects` | any user |
/// | `GET /projects/:id`, `GET /projects/:id/api-key`, `GET /projects/:id/members` | View |
/// | `PUT /projects/:id`, `POST /projects/:id/api-key/regenerate`, members `POST`/`DELETE` | Manage |
/// | `DELETE /projects/:id` | Delete |

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ApiJson, CurrentUser},
    routes::{auth::MessageResponse, not_blank},
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use kogase_shared::{
    auth::{
        authorization::{accessible_projects, authorize, Permission},
        middleware::Principal,
    },
    models::{
        project::{CreateProject, Project},
        project_user::{ProjectMember, ProjectRole, ProjectUser},
        user::User,
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Create or rename request
#[derive(Debug, Deserialize, Validate)]
pub struct ProjectRequest {
    #[validate(
        custom(function = "not_blank"),
        length(min = 1, max = 100, message = "Name must be 1 to 100 characters")
    )]
    pub name: String,
}

/// A project together with its API key
#[derive(Debug, Serialize)]
pub struct ProjectWithKey {
    #[serde(flatten)]
    pub project: Project,
    pub api_key: String,
}

impl From<Project> for ProjectWithKey {
    fn from(project: Project) -> Self {
        let api_key = project.api_key.clone();
        Self { project, api_key }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiKeyResponse {
    pub api_key: String,
}

/// Add-member request
#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[serde(default = "default_member_role")]
    pub role: ProjectRole,
}

fn default_member_role() -> ProjectRole {
    ProjectRole::Contributor
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MembershipResponse {
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: ProjectRole,
}

/// Projects visible to the caller
///
/// Admins see every project; other users see the ones they own or belong to.
pub async fn list_projects(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Vec<Project>>> {
    let projects = accessible_projects(&state.db, &user).await?;
    Ok(Json(projects))
}

/// Creates a project owned by the caller, with a fresh API key
pub async fn create_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<ProjectRequest>,
) -> ApiResult<(StatusCode, Json<ProjectWithKey>)> {
    req.validate()?;

    let project = Project::create(
        &state.db,
        CreateProject {
            name: req.name.trim().to_string(),
            owner_id: user.user_id,
        },
    )
    .await?;

    tracing::info!(project_id = %project.id, owner_id = %user.user_id, "Project created");
    Ok((StatusCode::CREATED, Json(project.into())))
}

pub async fn get_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    let project = authorize(&state.db, &Principal::User(user), id, Permission::View).await?;
    Ok(Json(project))
}

/// Renames a project
pub async fn update_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<ProjectRequest>,
) -> ApiResult<Json<Project>> {
    req.validate()?;
    authorize(&state.db, &Principal::User(user), id, Permission::Manage).await?;

    let project = Project::update_name(&state.db, id, req.name.trim())
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

    Ok(Json(project))
}

/// Soft-deletes a project; its API key stops working immediately
pub async fn delete_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    authorize(&state.db, &Principal::User(user), id, Permission::Delete).await?;

    if !Project::soft_delete(&state.db, id).await? {
        return Err(ApiError::NotFound("Project not found".to_string()));
    }

    tracing::info!(project_id = %id, user_id = %user.user_id, "Project deleted");
    Ok(MessageResponse::new("Project deleted successfully"))
}

pub async fn get_api_key(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiKeyResponse>> {
    let project = authorize(&state.db, &Principal::User(user), id, Permission::View).await?;
    Ok(Json(ApiKeyResponse {
        api_key: project.api_key,
    }))
}

/// Replaces the API key in one statement; the old key is dead on return
pub async fn regenerate_api_key(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ApiKeyResponse>> {
    authorize(&state.db, &Principal::User(user), id, Permission::Manage).await?;

    let project = Project::regenerate_api_key(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Project not found".to_string()))?;

    tracing::info!(project_id = %id, user_id = %user.user_id, "API key regenerated");
    Ok(Json(ApiKeyResponse {
        api_key: project.api_key,
    }))
}

pub async fn list_members(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ProjectMember>>> {
    authorize(&state.db, &Principal::User(user), id, Permission::View).await?;

    let members = ProjectUser::list_by_project(&state.db, id).await?;
    Ok(Json(members))
}

/// Adds a member or changes an existing member's role
pub async fn add_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    ApiJson(req): ApiJson<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<MembershipResponse>)> {
    let project = authorize(&state.db, &Principal::User(user), id, Permission::Manage).await?;

    if req.user_id == project.owner_id {
        return Err(ApiError::invalid(
            "user_id",
            "The project owner cannot be added as a member",
        ));
    }

    if User::find_by_id(&state.db, req.user_id).await?.is_none() {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    ProjectUser::upsert(&state.db, id, req.user_id, req.role).await?;

    tracing::info!(
        project_id = %id,
        member_id = %req.user_id,
        role = req.role.as_str(),
        "Project member added"
    );
    Ok((
        StatusCode::CREATED,
        Json(MembershipResponse {
            project_id: id,
            user_id: req.user_id,
            role: req.role,
        }),
    ))
}

pub async fn remove_member(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, member_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<MessageResponse>> {
    authorize(&state.db, &Principal::User(user), id, Permission::Manage).await?;

    if !ProjectUser::delete(&state.db, id, member_id).await? {
        return Err(ApiError::NotFound("Member not found".to_string()));
    }

    tracing::info!(project_id = %id, member_id = %member_id, "Project member removed");
    Ok(MessageResponse::new("Member removed successfully"))
}
