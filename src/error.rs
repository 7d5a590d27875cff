//! Error types and failure classification

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::time::Duration;

use crate::backend::descriptor::ProtocolKind;

pub type Result<T> = std::result::Result<T, AppError>;

/// Classification of a backend failure.
///
/// Retriable failures are judged backend-specific and transient: the caller
/// escalates to the next backend in the ordering. Fatal failures are judged
/// request-specific: escalation would fail the same way, so the failure
/// propagates immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Retriable,
    Fatal,
}

/// A failure reported by (or while reaching) a single upstream backend.
///
/// Every variant maps to exactly one [`ErrorClass`]; unrecognized shapes land
/// in `Other`, which is fatal so an unknown condition can never cause an
/// escalation loop.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("rate limited by upstream")]
    RateLimited,

    #[error("upstream server error (status {status}): {message}")]
    Server { status: u16, message: String },

    #[error("malformed upstream response: {0}")]
    Decode(String),

    #[error("upstream rejected request (status {status}): {message}")]
    InvalidRequest { status: u16, message: String },

    #[error("model or resource not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Other(String),
}

impl BackendError {
    /// Classify this failure as retriable or fatal.
    ///
    /// A `Decode` failure counts as retriable: the upstream produced a
    /// malformed payload, which is its fault, not the request's.
    pub fn class(&self) -> ErrorClass {
        match self {
            BackendError::Timeout(_)
            | BackendError::Connection(_)
            | BackendError::RateLimited
            | BackendError::Server { .. }
            | BackendError::Decode(_) => ErrorClass::Retriable,
            BackendError::InvalidRequest { .. }
            | BackendError::NotFound(_)
            | BackendError::InvalidArgument(_)
            | BackendError::Other(_) => ErrorClass::Fatal,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.class() == ErrorClass::Retriable
    }

    /// Short machine-readable kind, used in structured logs and in the
    /// fallback notice sent to streaming clients.
    pub fn kind_str(&self) -> &'static str {
        match self {
            BackendError::Timeout(_) => "timeout",
            BackendError::Connection(_) => "connection",
            BackendError::RateLimited => "rate_limited",
            BackendError::Server { .. } => "server_error",
            BackendError::Decode(_) => "decode",
            BackendError::InvalidRequest { .. } => "invalid_request",
            BackendError::NotFound(_) => "not_found",
            BackendError::InvalidArgument(_) => "invalid_argument",
            BackendError::Other(_) => "other",
        }
    }

    /// Map a status code from an upstream HTTP response to a failure kind.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            429 => BackendError::RateLimited,
            404 => BackendError::NotFound(message),
            s if s >= 500 => BackendError::Server { status: s, message },
            s => BackendError::InvalidRequest { status: s, message },
        }
    }

    /// Map a transport-layer error from the HTTP client to a failure kind.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            BackendError::Timeout(timeout)
        } else if err.is_connect() {
            BackendError::Connection(err.to_string())
        } else if err.is_decode() {
            BackendError::Decode(err.to_string())
        } else if err.is_builder() {
            BackendError::InvalidArgument(err.to_string())
        } else {
            BackendError::Connection(err.to_string())
        }
    }
}

/// Application-level error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The client request failed validation before reaching any backend.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A single backend failed fatally; no further backends were tried.
    #[error("backend '{backend}' failed: {source}")]
    Backend {
        backend: String,
        #[source]
        source: BackendError,
    },

    /// Every configured backend of the given kind failed retriably.
    #[error("all {kind} backends exhausted after {attempts} attempt(s): {detail}")]
    AllBackendsExhausted {
        kind: ProtocolKind,
        attempts: usize,
        detail: String,
    },

    /// Transport failure on an established streaming session.
    #[error("session transport error: {0}")]
    SessionTransport(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Config(_) | AppError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Backend { source, .. } => match source {
                BackendError::NotFound(_) => StatusCode::NOT_FOUND,
                BackendError::InvalidRequest { .. } | BackendError::InvalidArgument(_) => {
                    StatusCode::BAD_REQUEST
                }
                BackendError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            AppError::AllBackendsExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::SessionTransport(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            AppError::Config(_) | AppError::InvalidConfig(_) => "configuration_error",
            AppError::InvalidRequest(_) => "invalid_request_error",
            AppError::Backend { .. } => "backend_error",
            AppError::AllBackendsExhausted { .. } => "all_backends_exhausted",
            AppError::SessionTransport(_) => "session_transport_error",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": self.error_type(),
                "code": status.as_str(),
            }
        }));
        (status, body).into_response()
    }
}
