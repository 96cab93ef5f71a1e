// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    // 500 Internal Server Error
    InternalServerError(String),

    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    AuthError(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict (e.g., duplicate exam code)
    Conflict(String),

    // Center access token rejections: unknown token, expired window,
    // exhausted usage cap, suspended link.
    InvalidToken,
    TokenExpired,
    TokenExhausted,
    LinkSuspended,

    // 409: an ACTIVE link already exists for the (exam, center) pair
    DuplicateCenter(String),

    // Session lifecycle
    DuplicateSession(String),
    SessionNotFound,
    SessionAlreadyClosed,
    SessionNotActive,

    // Vault / package delivery
    DecryptionFailed,
    PackageNotReady(String),

    // A sync batch aborted before every record was uploaded
    SyncPartialFailure(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for AppError {}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
/// The `code` field is stable and machine-readable; center software switches
/// on it, candidates only ever see the message.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal Server Error".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            AppError::AuthError(msg) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            AppError::InvalidToken => (
                StatusCode::NOT_FOUND,
                "INVALID_TOKEN",
                "This exam link is not recognized".to_string(),
            ),
            AppError::TokenExpired => (
                StatusCode::FORBIDDEN,
                "TOKEN_EXPIRED",
                "Access for this center has expired".to_string(),
            ),
            AppError::TokenExhausted => (
                StatusCode::FORBIDDEN,
                "TOKEN_EXHAUSTED",
                "This center has reached its permitted number of sessions".to_string(),
            ),
            AppError::LinkSuspended => (
                StatusCode::FORBIDDEN,
                "LINK_SUSPENDED",
                "Access for this center has been suspended".to_string(),
            ),
            AppError::DuplicateCenter(msg) => (StatusCode::CONFLICT, "DUPLICATE_CENTER", msg),
            AppError::DuplicateSession(msg) => (StatusCode::CONFLICT, "DUPLICATE_SESSION", msg),
            AppError::SessionNotFound => (
                StatusCode::NOT_FOUND,
                "SESSION_NOT_FOUND",
                "Session not found".to_string(),
            ),
            AppError::SessionAlreadyClosed => (
                StatusCode::CONFLICT,
                "SESSION_ALREADY_CLOSED",
                "This session has already been closed".to_string(),
            ),
            AppError::SessionNotActive => (
                StatusCode::CONFLICT,
                "SESSION_NOT_ACTIVE",
                "This session is no longer active".to_string(),
            ),
            AppError::DecryptionFailed => (
                StatusCode::FORBIDDEN,
                "DECRYPTION_FAILED",
                "The question paper could not be decrypted".to_string(),
            ),
            AppError::PackageNotReady(msg) => (StatusCode::CONFLICT, "PACKAGE_NOT_READY", msg),
            AppError::SyncPartialFailure(msg) => {
                tracing::error!("Sync batch aborted: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "SYNC_PARTIAL_FAILURE",
                    msg,
                )
            }
        };
        let body = Json(json!({
            "error": error_message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::InternalServerError`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}
