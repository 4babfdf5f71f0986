//! Unified error types for deployboard.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Unified error type for the server.
#[derive(Error, Debug)]
pub enum AppError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Stream error.
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Why the validator could not turn a token into an identity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// The token was rejected by the identity provider.
    #[error("token rejected: {0}")]
    Invalid(String),

    /// The identity provider could not be reached or answered with garbage.
    #[error("validator unavailable: {0}")]
    Unavailable(String),
}

/// Reason attached to a rejected request.
#[derive(
    Error, Debug, Clone, Copy, PartialEq, Eq, strum::AsRefStr, strum::EnumIter,
)]
#[strum(serialize_all = "snake_case")]
pub enum GateRejection {
    /// No credential on the request.
    #[error("authentication required")]
    Unauthenticated,

    /// Credential present but not accepted.
    #[error("invalid access token")]
    InvalidToken,

    /// The identity backend failed; not a client problem.
    #[error("authentication backend unavailable")]
    ValidatorUnavailable,
}

impl GateRejection {
    /// HTTP status used when no login redirect applies.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateRejection::Unauthenticated | GateRejection::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            GateRejection::ValidatorUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Whether sending the user to the login page can resolve this.
    pub fn is_recoverable_by_login(&self) -> bool {
        !matches!(self, GateRejection::ValidatorUnavailable)
    }
}

impl IntoResponse for GateRejection {
    fn into_response(self) -> Response {
        let body = json!({ "error": self.to_string(), "reason": self.as_ref() });
        (self.status_code(), Json(body)).into_response()
    }
}

/// Auto-flush stream errors.
#[derive(Error, Debug)]
pub enum StreamError {
    /// The underlying sink refused a write.
    #[error("sink write failed: {0}")]
    SinkWrite(#[source] std::io::Error),

    /// Write attempted after the stream finished closing.
    #[error("stream is closed")]
    Closed,

    /// A flush period of zero would spin the background task.
    #[error("flush period must be greater than zero")]
    ZeroPeriod,
}

/// Errors returned by API handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    /// A path segment failed validation.
    #[error("invalid {field}: {value:?}")]
    InvalidSegment {
        /// Which segment was bad.
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// The configured command could not be started.
    #[error("failed to start command: {0}")]
    Spawn(#[source] std::io::Error),

    /// Stream setup failed.
    #[error(transparent)]
    Stream(#[from] StreamError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidSegment { .. } => StatusCode::BAD_REQUEST,
            ApiError::Spawn(_) | ApiError::Stream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, AppError>;
