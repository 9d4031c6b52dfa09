//! Backfill job DTOs for create, list, lifecycle, and log operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::domain::{BackfillJob, JobKind, JobLog};

/// Request body for `POST /backfill/jobs`.
///
/// The `job_type`/`config` pair is the tagged job configuration, e.g.
///
/// ```json
/// {
///   "source_id": "6b8f…",
///   "job_type": "full_historical",
///   "config": { "days": 7, "types": "all" },
///   "execute_immediately": true
/// }
/// ```
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateJobRequest {
    /// Source catalogue entry to ingest from.
    pub source_id: Uuid,
    /// Tagged job configuration (`job_type` + `config`).
    #[serde(flatten)]
    pub kind: JobKind,
    /// Launch an executor as soon as the row is created.
    #[serde(default)]
    pub execute_immediately: bool,
}

/// Single-job envelope returned by create, get, and lifecycle endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobEnvelope {
    /// The job row.
    pub job: BackfillJob,
}

/// Response body for `GET /backfill/jobs`.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobListResponse {
    /// Jobs, newest first.
    pub jobs: Vec<BackfillJob>,
}

/// Lifecycle acknowledgement with the fresh job row.
#[derive(Debug, Serialize, ToSchema)]
pub struct LifecycleResponse {
    /// Human-readable outcome.
    pub message: String,
    /// The job row after the transition.
    pub job: BackfillJob,
}

/// Query parameters for `GET /backfill/jobs`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct JobListParams {
    /// Only jobs in this status (`pending`, `running`, …).
    pub status: Option<String>,
    /// Only jobs against this source.
    pub source_id: Option<Uuid>,
    /// Only jobs of this type (`full_historical` or `date_range`).
    pub job_type: Option<String>,
    /// Maximum rows to return (1–200). Defaults to 50.
    pub limit: Option<i64>,
    /// Rows to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Optional request body for `POST /backfill/jobs/{id}/resume`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ResumeRequest {
    /// Relaunch an executor after moving the job back to `pending`.
    /// Defaults to `true`.
    #[serde(default = "default_true")]
    pub execute_immediately: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ResumeRequest {
    fn default() -> Self {
        Self {
            execute_immediately: true,
        }
    }
}

/// Query parameters for `GET /backfill/jobs/{id}/logs`.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct LogListParams {
    /// Only lines at this level (`info`, `warn`, `error`).
    pub level: Option<String>,
    /// Maximum rows to return (1–200). Defaults to 50.
    pub limit: Option<i64>,
    /// Rows to skip. Defaults to 0.
    pub offset: Option<i64>,
}

/// Response body for `GET /backfill/jobs/{id}/logs`.
#[derive(Debug, Serialize, ToSchema)]
pub struct LogListResponse {
    /// Log lines, newest first.
    pub logs: Vec<JobLogDto>,
}

/// One job log line.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobLogDto {
    /// Severity.
    pub level: String,
    /// Message text.
    pub message: String,
    /// Optional structured payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Value>,
    /// Append timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<JobLog> for JobLogDto {
    fn from(log: JobLog) -> Self {
        Self {
            level: log.level.to_string(),
            message: log.message,
            meta: log.meta,
            created_at: log.created_at,
        }
    }
}
