/// The signed-in user's own account
///
/// - `GET /api/v1/dashboard/user/me`
/// - `PUT /api/v1/dashboard/user/me` {name?, password?}
/// - `DELETE /api/v1/dashboard/user/me`

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
    extract::{ApiJson, CurrentUser},
    routes::{auth::MessageResponse, not_blank},
};
use axum::{extract::State, Json};
use kogase_shared::{
    auth::password,
    models::{
        auth_token::AuthToken,
        user::{UpdateUser, User},
    },
};
use serde::Deserialize;
use validator::Validate;

/// Profile update; omitted fields are left unchanged
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateMeRequest {
    #[validate(
        custom(function = "not_blank"),
        length(min = 1, max = 100, message = "Name must be 1 to 100 characters")
    )]
    pub name: Option<String>,

    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: Option<String>,
}

/// Current user
pub async fn me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<User>> {
    // The token resolved, so only a concurrent delete gets here
    let user = User::find_by_id(&state.db, user.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;

    Ok(Json(user))
}

/// Updates name and/or password
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<UpdateMeRequest>,
) -> ApiResult<Json<User>> {
    req.validate()?;

    let password_hash = match req.password.as_deref() {
        Some(plain) => {
            password::validate_password(plain)?;
            Some(password::hash_password(plain)?)
        }
        None => None,
    };

    let updated = User::update(
        &state.db,
        user.user_id,
        UpdateUser {
            name: req.name.map(|n| n.trim().to_string()),
            password_hash,
        },
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    tracing::info!(user_id = %user.user_id, "User profile updated");
    Ok(Json(updated))
}

/// Soft-deletes the account and revokes every session
pub async fn delete_me(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<MessageResponse>> {
    if !User::soft_delete(&state.db, user.user_id).await? {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    let revoked = AuthToken::revoke_all_for_user(&state.db, user.user_id).await?;

    tracing::info!(user_id = %user.user_id, revoked_tokens = revoked, "User deleted");
    Ok(MessageResponse::new("User deleted successfully"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_rejects_blank_name() {
        let req: UpdateMeRequest = serde_json::from_value(serde_json::json!({ "name": "  " })).unwrap();
        assert!(req.validate().unwrap_err().field_errors().contains_key("name"));

        let req: UpdateMeRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(req.validate().is_ok());
    }
}
