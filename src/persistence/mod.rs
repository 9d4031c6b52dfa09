//! Persistence layer: durable stores for jobs, logs, snapshots, the
//! source catalogue, and automations.
//!
//! Every store is a trait so the service layer can run against the
//! PostgreSQL implementation in production and the in-memory twin in
//! tests. The job row is the single source of truth for execution
//! state — the executor re-reads it between chunks and never caches
//! status.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    Automation, BackfillJob, ChunkKey, CrawlerSource, DedupKey, JobId, JobLog, JobStatus,
    LogLevel, NormalizedPrice, TypeMapping, ZoneMapping,
};
use crate::error::ServiceError;

/// Filters and paging for job listings.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only jobs in this status.
    pub status: Option<JobStatus>,
    /// Only jobs against this source.
    pub source_id: Option<Uuid>,
    /// Only jobs with this `job_type` discriminator.
    pub job_type: Option<String>,
    /// Page size; `None` means the store default (50).
    pub limit: Option<i64>,
    /// Page offset.
    pub offset: Option<i64>,
}

/// Partial update applied to a job row. `None` fields are left as-is.
#[derive(Debug, Clone, Default)]
pub struct JobUpdate {
    /// New lifecycle status.
    pub status: Option<JobStatus>,
    /// Sets `started_at` if the row's value is still null.
    pub started_at: Option<DateTime<Utc>>,
    /// Sets `finished_at`.
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    /// An update that only changes the status.
    #[must_use]
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

/// Durable storage for [`BackfillJob`] rows and their append-only logs.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug {
    /// Inserts a freshly created job row.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn insert_job(&self, job: &BackfillJob) -> Result<(), ServiceError>;

    /// Loads a job by id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn get_job(&self, id: JobId) -> Result<Option<BackfillJob>, ServiceError>;

    /// Lists jobs matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<BackfillJob>, ServiceError>;

    /// Applies a partial update to a job row and bumps `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::JobNotFound`] if the row is gone and
    /// [`ServiceError::Store`] on storage failure.
    async fn update_job(&self, id: JobId, update: &JobUpdate) -> Result<(), ServiceError>;

    /// Persists the progress cursor after a chunk lands.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::JobNotFound`] if the row is gone and
    /// [`ServiceError::Store`] on storage failure.
    async fn update_cursor(&self, id: JobId, cursor: &ChunkKey) -> Result<(), ServiceError>;

    /// Deletes a job row and, transitively, its logs.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn delete_job(&self, id: JobId) -> Result<(), ServiceError>;

    /// Appends one log line for a job.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn append_log(
        &self,
        id: JobId,
        level: LogLevel,
        message: &str,
        meta: Option<serde_json::Value>,
    ) -> Result<(), ServiceError>;

    /// Lists a job's logs, newest first, optionally filtered by level.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn list_logs(
        &self,
        id: JobId,
        level: Option<LogLevel>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<JobLog>, ServiceError>;
}

/// Durable storage for canonical price snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync + std::fmt::Debug {
    /// Whether a backfilled snapshot already exists for the given
    /// day-granularity key.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn backfilled_exists(&self, key: &DedupKey) -> Result<bool, ServiceError>;

    /// Inserts the given records as backfilled snapshots, returning the
    /// number written.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn insert_backfilled(&self, records: &[NormalizedPrice]) -> Result<u64, ServiceError>;

    /// Deletes non-backfilled snapshots older than `before`, returning
    /// the number removed. Used by the snapshot cleanup automation.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn delete_live_before(&self, before: DateTime<Utc>) -> Result<u64, ServiceError>;
}

/// Read-only access to the source catalogue and normalization mappings.
#[async_trait]
pub trait CatalogueStore: Send + Sync + std::fmt::Debug {
    /// Loads a source by id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn get_source(&self, id: Uuid) -> Result<Option<CrawlerSource>, ServiceError>;

    /// Looks up the product type mapping for `(source, external_code)`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn type_mapping(
        &self,
        source_id: Uuid,
        external_code: &str,
    ) -> Result<Option<TypeMapping>, ServiceError>;

    /// Looks up the zone mapping for `(source, external_code)`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn zone_mapping(
        &self,
        source_id: Uuid,
        external_code: &str,
    ) -> Result<Option<ZoneMapping>, ServiceError>;
}

/// Storage for recurring automation definitions.
#[async_trait]
pub trait AutomationStore: Send + Sync + std::fmt::Debug {
    /// Lists every automation with `is_active = true`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn list_active(&self) -> Result<Vec<Automation>, ServiceError>;

    /// Records that the scheduler ran an automation.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    async fn set_last_run(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), ServiceError>;
}
