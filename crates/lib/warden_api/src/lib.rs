//! # warden_api
//!
//! HTTP API library for Warden.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;

use axum::Router;
use axum::routing::{get, post, put};
use tower_http::cors::{Any, CorsLayer};
use warden_core::AuthEngine;

use crate::handlers::{auth, permissions, roles};

/// Route paths served by [`router`].
pub mod routes {
    pub const POST_AUTH_REGISTER: &str = "/auth/register";
    pub const POST_AUTH_LOGIN: &str = "/auth/login";
    pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
    pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
    pub const GET_AUTH_PROFILE: &str = "/auth/profile";
    pub const GET_AUTH_ROLES: &str = "/auth/roles";
    pub const POST_AUTH_PERMISSIONS_CHECK: &str = "/auth/permissions/check";
    pub const PUT_AUTH_CREDENTIALS_ID_PERMISSIONS: &str = "/auth/credentials/{id}/permissions";
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: AuthEngine,
}

impl AppState {
    pub fn new(engine: AuthEngine) -> Self {
        Self { engine }
    }
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_AUTH_REGISTER, post(auth::register_handler))
        .route(routes::POST_AUTH_LOGIN, post(auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(auth::refresh_handler))
        .route(routes::POST_AUTH_LOGOUT, post(auth::logout_handler));

    // Protected routes (require a bearer access token)
    let protected = Router::new()
        .route(routes::GET_AUTH_PROFILE, get(auth::profile_handler))
        .route(routes::GET_AUTH_ROLES, get(roles::list_roles_handler))
        .route(
            routes::POST_AUTH_PERMISSIONS_CHECK,
            post(permissions::check_permission_handler),
        )
        .route(
            routes::PUT_AUTH_CREDENTIALS_ID_PERMISSIONS,
            put(permissions::update_permissions_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
