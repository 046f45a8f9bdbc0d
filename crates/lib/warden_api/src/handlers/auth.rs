//! Authentication request handlers.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use warden_core::models::{Registration, TokenPair};

use super::client_info;
use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::models::{
    AuthResponse, LoginRequest, LogoutRequest, MessageResponse, ProfileResponse, RefreshRequest,
    RegisterRequest,
};

/// `POST /auth/register`: create a credential and issue its first token pair.
pub async fn register_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let registration = Registration {
        email: body.email,
        password: body.password,
        name: body.name,
        provider: body.provider,
    };
    let outcome = state
        .engine
        .register(registration, &client_info(&headers))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "Registration successful".into(),
            user: outcome.credential.into(),
            tokens: outcome.tokens,
        }),
    ))
}

/// `POST /auth/login`: authenticate with email + password.
pub async fn login_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let outcome = state
        .engine
        .login(&body.email, &body.password, &client_info(&headers))
        .await?;
    Ok(Json(AuthResponse {
        message: "Login successful".into(),
        user: outcome.credential.into(),
        tokens: outcome.tokens,
    }))
}

/// `POST /auth/refresh`: exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let pair = state
        .engine
        .refresh(&body.refresh_token, &client_info(&headers))
        .await?;
    Ok(Json(pair))
}

/// `POST /auth/logout`: always 200, whatever the body holds.
pub async fn logout_handler(State(state): State<AppState>, body: Bytes) -> Json<MessageResponse> {
    let body: LogoutRequest = serde_json::from_slice(&body).unwrap_or_default();
    if let Some(token) = body.refresh_token.as_deref() {
        state.engine.logout(token).await;
    }
    Json(MessageResponse {
        message: "Logged out successfully".into(),
    })
}

/// `GET /auth/profile`: the authenticated principal.
pub async fn profile_handler(
    Extension(AuthenticatedUser(context)): Extension<AuthenticatedUser>,
) -> Json<ProfileResponse> {
    Json(context.into())
}
