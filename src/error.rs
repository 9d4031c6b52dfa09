//! Service error types with HTTP status code mapping.
//!
//! [`ServiceError`] is the central error type for the control surface
//! and the stores. Each variant maps to a specific HTTP status code and
//! structured JSON error response. Fetch failures inside the executor
//! use [`crate::service::fetch::FetchError`] instead and never reach a
//! caller — they are logged against the job and reflected only in job
//! status.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::domain::{JobId, JobStatus};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2101,
///     "message": "illegal transition: completed -> paused",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`ServiceError`]).
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category           | HTTP Status                |
/// |-----------|--------------------|----------------------------|
/// | 1000–1999 | Validation         | 400 Bad Request            |
/// | 2000–2099 | Not Found          | 404 Not Found              |
/// | 2100–2199 | State Conflict     | 409 Conflict               |
/// | 3000–3999 | Server             | 500 Internal Server Error  |
/// | 4001      | Capability Denied  | 401 Unauthorized           |
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Request validation failed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Source with the given ID is not in the catalogue.
    #[error("source not found: {0}")]
    SourceNotFound(uuid::Uuid),

    /// Job with the given ID was not found.
    #[error("job not found: {0}")]
    JobNotFound(JobId),

    /// The requested lifecycle change is not permitted by the job state
    /// machine.
    #[error("illegal transition: {from} -> {to}")]
    IllegalTransition {
        /// Status the job is currently in.
        from: JobStatus,
        /// Status the caller asked for.
        to: JobStatus,
    },

    /// Operation conflicts with the job's current state (e.g. deleting
    /// an active job).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Admin capability check failed.
    #[error("admin capability required")]
    Unauthorized,

    /// Persistence layer failure.
    #[error("store error: {0}")]
    Store(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Validation(_) => 1001,
            Self::SourceNotFound(_) => 2001,
            Self::JobNotFound(_) => 2002,
            Self::IllegalTransition { .. } => 2101,
            Self::Conflict(_) => 2102,
            Self::Store(_) => 3001,
            Self::Internal(_) => 3000,
            Self::Unauthorized => 4001,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::SourceNotFound(_) | Self::JobNotFound(_) => StatusCode::NOT_FOUND,
            Self::IllegalTransition { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_taxonomy() {
        assert_eq!(
            ServiceError::Validation(String::new()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::JobNotFound(JobId::new()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::IllegalTransition {
                from: JobStatus::Completed,
                to: JobStatus::Paused,
            }
            .status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::Store(String::new()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn error_codes_stay_in_their_ranges() {
        assert_eq!(ServiceError::Validation(String::new()).error_code(), 1001);
        assert_eq!(ServiceError::SourceNotFound(uuid::Uuid::new_v4()).error_code(), 2001);
        assert_eq!(ServiceError::Conflict(String::new()).error_code(), 2102);
    }
}
