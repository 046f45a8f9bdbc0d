//! Application error types.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use warden_core::AuthError;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

const INTERNAL_MESSAGE: &str = "An unexpected error occurred.";

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error")]
    Internal(String),
}

/// Uniform error projection rendered as the response body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParsedError {
    pub title: String,
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classify into the response projection. Internal detail is never exposed.
    pub fn parse(&self) -> ParsedError {
        let status = self.status();
        let message = match self {
            AppError::Validation(m)
            | AppError::NotFound(m)
            | AppError::Conflict(m)
            | AppError::Unauthorized(m)
            | AppError::Forbidden(m) => m.clone(),
            AppError::Internal(_) => INTERNAL_MESSAGE.to_string(),
        };
        ParsedError {
            title: status
                .canonical_reason()
                .unwrap_or("Internal Server Error")
                .to_string(),
            message,
            code: status.as_u16(),
            details: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let AppError::Internal(detail) = &self {
            error!(detail = %detail, "request failed");
        }
        (self.status(), Json(self.parse())).into_response()
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Conflict(msg) => AppError::Conflict(msg),
            AuthError::Unauthorized(msg) => AppError::Unauthorized(msg),
            AuthError::NotFound(msg) => AppError::NotFound(msg),
            AuthError::Validation(msg) => AppError::Validation(msg),
            AuthError::Configuration(msg) => AppError::Internal(format!("configuration: {msg}")),
            AuthError::Store(e) => AppError::Internal(format!("store: {e}")),
            AuthError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::store::StoreError;

    #[test]
    fn auth_errors_map_to_statuses() {
        let cases = [
            (AuthError::Conflict("x".into()), StatusCode::CONFLICT),
            (AuthError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (AuthError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AuthError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                AuthError::Configuration("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                AuthError::Store(StoreError::Timeout),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn internal_detail_is_hidden() {
        let parsed = AppError::Internal("pool exhausted on db-3".into()).parse();
        assert_eq!(parsed.code, 500);
        assert_eq!(parsed.title, "Internal Server Error");
        assert_eq!(parsed.message, INTERNAL_MESSAGE);
    }

    #[test]
    fn parsed_error_serializes_without_empty_details() {
        let parsed = AppError::Conflict("Email already registered".into()).parse();
        let json = serde_json::to_value(&parsed).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "title": "Conflict",
                "message": "Email already registered",
                "code": 409,
            })
        );
    }
}
