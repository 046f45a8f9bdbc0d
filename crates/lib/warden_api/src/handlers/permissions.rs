//! Permission check and override administration.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use uuid::Uuid;

use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    CheckPermissionRequest, CredentialView, PermissionCheckResponse, UpdatePermissionsRequest,
};

/// Permission required to replace another credential's overrides.
pub const MANAGE_PERMISSIONS: &str = "manage:permissions";

/// `POST /auth/permissions/check`: does the caller hold `permission`?
pub async fn check_permission_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(context)): Extension<AuthenticatedUser>,
    Json(body): Json<CheckPermissionRequest>,
) -> Json<PermissionCheckResponse> {
    let has_permission = state
        .engine
        .has_permission(context.credential_id, &body.permission)
        .await;
    Json(PermissionCheckResponse { has_permission })
}

/// `PUT /auth/credentials/{id}/permissions`: replace a credential's overrides.
pub async fn update_permissions_handler(
    State(state): State<AppState>,
    Extension(AuthenticatedUser(context)): Extension<AuthenticatedUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdatePermissionsRequest>,
) -> AppResult<Json<CredentialView>> {
    if !state
        .engine
        .has_permission(context.credential_id, MANAGE_PERMISSIONS)
        .await
    {
        return Err(AppError::Forbidden(format!(
            "Missing permission {MANAGE_PERMISSIONS}"
        )));
    }
    let credential = state
        .engine
        .update_permissions(id, body.permissions.into_iter().collect())
        .await?;
    Ok(Json(credential.into()))
}
