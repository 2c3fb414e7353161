//! Error taxonomy for the HTTP surface.
//!
//! Every handler returns [`AppResult`]; a failure renders as a JSON body of
//! the form `{"error": "<kind>", "message": "<detail>"}` with the matching
//! status code. Database and configuration failures never leak detail to the
//! client.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

pub type AppResult<T> = Result<T, AppError>;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Credentials missing, expired or unverifiable (401).
    #[error("unauthorized: {0}")]
    AuthenticationRequired(String),
    /// Authenticated, but the policy matrix denies the action (403).
    #[error("forbidden: {0}")]
    PermissionDenied(String),
    #[error("not found: {0}")]
    MissingResource(String),
    /// A uniqueness or structural invariant would break (409).
    #[error("conflict: {0}")]
    ResourceConflict(String),
    /// The request payload fails validation (400).
    #[error("bad request: {0}")]
    Validation(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("database error")]
    Database(#[from] sqlx::Error),
    #[error("internal server error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::AuthenticationRequired(message.into())
    }

    /// Token-specific 401, kept separate at the call sites for log clarity.
    pub fn token(message: impl Into<String>) -> Self {
        Self::AuthenticationRequired(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::PermissionDenied(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::MissingResource(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::ResourceConflict(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AuthenticationRequired(_) => StatusCode::UNAUTHORIZED,
            Self::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Self::MissingResource(_) => StatusCode::NOT_FOUND,
            Self::ResourceConflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Configuration(_) | Self::Database(_) | Self::Unexpected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable kind, the `error` field of the JSON body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationRequired(_) => "unauthorized",
            Self::PermissionDenied(_) => "forbidden",
            Self::MissingResource(_) => "not_found",
            Self::ResourceConflict(_) => "conflict",
            Self::Validation(_) => "bad_request",
            Self::Configuration(_) => "configuration",
            Self::Database(_) => "database",
            Self::Unexpected(_) => "internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let body = ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        Self::Unexpected(value.to_string())
    }
}
