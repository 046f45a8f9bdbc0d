//! Bearer token extraction and access-token authentication.

use axum::http::header::AUTHORIZATION;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use warden_core::models::AuthContext;

use crate::AppState;
use crate::error::AppError;

/// Stored in request extensions once the bearer token has been authenticated.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AuthContext);

/// Axum middleware: extracts `Authorization: Bearer <token>`, resolves it
/// through the engine and injects [`AuthenticatedUser`] into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))?;

    let context = state.engine.authenticate(token.trim()).await?;
    request.extensions_mut().insert(AuthenticatedUser(context));

    Ok(next.run(request).await)
}
