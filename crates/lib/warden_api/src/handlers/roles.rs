//! Role listing.

use axum::Json;
use axum::extract::State;

use crate::AppState;
use crate::error::AppResult;
use crate::models::RoleView;

/// `GET /auth/roles`: every role, lowest level first.
pub async fn list_roles_handler(State(state): State<AppState>) -> AppResult<Json<Vec<RoleView>>> {
    let roles = state.engine.roles().list().await?;
    Ok(Json(roles.into_iter().map(RoleView::from).collect()))
}
