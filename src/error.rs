//! Observer error types with failure classification and HTTP mapping.
//!
//! [`ObserverError`] is the central error type. Every variant belongs to an
//! [`ErrorClass`] that decides how a failed scrape cycle is treated (retried,
//! reported for selector maintenance, surfaced as a provisioning gap) and
//! maps to a specific HTTP status code for the viewer API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "unknown pool: kz-01",
///     "class": "referential"
///   }
/// }
/// ```
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Failure class of the error.
    pub class: ErrorClass,
}

/// How a failure is handled by the cycle runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network hiccups and half-rendered pages. The fetch is retried once.
    Transient,
    /// The page no longer matches the known layout or carries bad values.
    Structural,
    /// A write referenced a pool that was never provisioned.
    Referential,
    /// The storage backend rejected or failed the commit.
    Storage,
    /// Invalid input to an administrative or viewer request.
    Request,
    /// Anything else.
    Internal,
}

/// Observer error enum.
///
/// # Error Code Ranges
///
/// | Range     | Class                   | HTTP Status                |
/// |-----------|-------------------------|----------------------------|
/// | 1000–1999 | Request validation      | 400 Bad Request            |
/// | 2000–2999 | Referential / Not Found | 404 Not Found / 409 Conflict |
/// | 3000–3999 | Storage / Internal      | 500 Internal Server Error  |
/// | 4000–4999 | Scrape (fetch, parse)   | 502 Bad Gateway / 422      |
/// | 5000–5999 | Remote sync             | 502 Bad Gateway            |
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The observer page did not load within the fetch timeout.
    #[error("fetch timed out after {timeout_secs}s: {url}")]
    FetchTimeout {
        /// URL that was being fetched.
        url: String,
        /// Timeout that elapsed.
        timeout_secs: u64,
    },

    /// Network-level failure while loading the observer page.
    #[error("network error: {0}")]
    Network(String),

    /// The page rendered without the worker rows its summary announces.
    #[error("incomplete page: {0}")]
    IncompletePage(String),

    /// The page did not contain the elements of the known layout.
    #[error("page structure mismatch: {0}")]
    PageStructure(String),

    /// A raw field did not match any known unit or format pattern.
    #[error("malformed field `{field}`: {value:?}")]
    MalformedField {
        /// Logical name of the field (e.g. `summary.balance`).
        field: String,
        /// Raw value as scraped.
        value: String,
    },

    /// Two worker rows of one cycle share the same identifier.
    #[error("duplicate worker `{worker}` in one cycle")]
    DuplicateWorker {
        /// Worker identifier that appeared more than once.
        worker: String,
    },

    /// The pool has no identity record.
    #[error("unknown pool: {0}")]
    UnknownPool(String),

    /// A pool with this identifier is already provisioned.
    #[error("pool already exists: {0}")]
    PoolExists(String),

    /// The pool exists but no cycle has been committed for it yet.
    #[error("no observations yet for pool: {0}")]
    NoObservations(String),

    /// Anomaly event with the given row id was not found.
    #[error("anomaly not found: {0}")]
    AnomalyNotFound(i64),

    /// Request validation failed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence layer failure.
    #[error("persistence error: {0}")]
    PersistenceError(String),

    /// Remote data store rejected or failed a push.
    #[error("remote sync error: {0}")]
    RemoteSync(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ObserverError {
    /// Builds a [`ObserverError::MalformedField`].
    #[must_use]
    pub fn malformed(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::MalformedField {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Returns the failure class of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::FetchTimeout { .. } | Self::Network(_) | Self::IncompletePage(_) => {
                ErrorClass::Transient
            }
            Self::PageStructure(_) | Self::MalformedField { .. } | Self::DuplicateWorker { .. } => {
                ErrorClass::Structural
            }
            Self::UnknownPool(_)
            | Self::PoolExists(_)
            | Self::AnomalyNotFound(_)
            | Self::NoObservations(_) => ErrorClass::Referential,
            Self::PersistenceError(_) => ErrorClass::Storage,
            Self::InvalidRequest(_) | Self::Config(_) => ErrorClass::Request,
            Self::RemoteSync(_) | Self::Internal(_) => ErrorClass::Internal,
        }
    }

    /// Returns `true` when the failed step may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.class(), ErrorClass::Transient)
    }

    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidRequest(_) => 1001,
            Self::Config(_) => 1002,
            Self::UnknownPool(_) => 2001,
            Self::AnomalyNotFound(_) => 2002,
            Self::PoolExists(_) => 2003,
            Self::NoObservations(_) => 2004,
            Self::Internal(_) => 3000,
            Self::PersistenceError(_) => 3001,
            Self::FetchTimeout { .. } => 4001,
            Self::Network(_) => 4002,
            Self::IncompletePage(_) => 4003,
            Self::PageStructure(_) => 4004,
            Self::MalformedField { .. } => 4005,
            Self::DuplicateWorker { .. } => 4006,
            Self::RemoteSync(_) => 5001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequest(_) | Self::Config(_) => StatusCode::BAD_REQUEST,
            Self::UnknownPool(_) | Self::AnomalyNotFound(_) | Self::NoObservations(_) => {
                StatusCode::NOT_FOUND
            }
            Self::PoolExists(_) => StatusCode::CONFLICT,
            Self::MalformedField { .. } | Self::DuplicateWorker { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Self::FetchTimeout { .. }
            | Self::Network(_)
            | Self::IncompletePage(_)
            | Self::PageStructure(_)
            | Self::RemoteSync(_) => StatusCode::BAD_GATEWAY,
            Self::PersistenceError(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ObserverError {
    fn from(err: sqlx::Error) -> Self {
        Self::PersistenceError(err.to_string())
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                class: self.class(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
