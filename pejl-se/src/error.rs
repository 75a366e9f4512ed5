//! Error types for pejl-se
//!
//! Defines module-specific error types using thiserror for clear error
//! propagation. Validation and state-conflict errors carry distinct variants
//! so callers can tell "already done" from "not found" and know which
//! failures are safe to retry.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Main error type for the pejl-se module
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors surfaced from pejl-common
    #[error(transparent)]
    Common(#[from] pejl_common::Error),

    /// Token does not exist
    #[error("Token not found")]
    TokenNotFound,

    /// Token was already redeemed (state conflict, never retry)
    #[error("Token already used")]
    TokenAlreadyUsed,

    /// Assessment is cancelled, no further submissions accepted
    #[error("Assessment closed: {0}")]
    AssessmentClosed(String),

    /// Submission batch does not cover every active question
    #[error("Incomplete submission: {0}")]
    IncompleteSubmission(String),

    /// Raw score outside the configured scale
    #[error("Score out of range: {0}")]
    ScoreOutOfRange(String),

    /// Token generation could not produce a unique value
    #[error("Token generation failed: {0}")]
    TokenGeneration(String),

    /// Operation not legal in the current lifecycle state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Delivery collaborator failure (retryable from the scan loop)
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// Invalid request parameter
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Resource not found (or outside the caller's customer scope)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using pejl-se Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// HTTP status for the API surface
    ///
    /// Validation errors map to 422, state conflicts to 409, lookups to 404.
    /// Infrastructure errors are opaque 500s; details stay in the log.
    fn status_code(&self) -> StatusCode {
        match self {
            Error::TokenNotFound | Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::TokenAlreadyUsed | Error::AssessmentClosed(_) | Error::InvalidState(_) => {
                StatusCode::CONFLICT
            }
            Error::IncompleteSubmission(_) | Error::ScoreOutOfRange(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Database(_)
            | Error::Io(_)
            | Error::Common(_)
            | Error::TokenGeneration(_)
            | Error::Delivery(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable error code for API clients
    fn code(&self) -> &'static str {
        match self {
            Error::TokenNotFound => "token_not_found",
            Error::TokenAlreadyUsed => "token_already_used",
            Error::AssessmentClosed(_) => "assessment_closed",
            Error::IncompleteSubmission(_) => "incomplete_submission",
            Error::ScoreOutOfRange(_) => "score_out_of_range",
            Error::InvalidState(_) => "invalid_state",
            Error::BadRequest(_) => "bad_request",
            Error::NotFound(_) => "not_found",
            _ => "internal_error",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Don't leak internal details for 500s
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Internal error on API surface: {}", self);
            "internal error".to_string()
        } else {
            self.to_string()
        };

        let body = Json(json!({
            "error": self.code(),
            "message": message,
        }));

        (status, body).into_response()
    }
}
