//! Job service: the backfill control surface.
//!
//! Validates creation requests and lifecycle transitions against the
//! job state machine, then applies them as read-modify-write updates on
//! the job store. Never fetches data itself — execution belongs to
//! [`super::executor::BackfillExecutor`].

use std::sync::Arc;

use chrono::Utc;

use crate::domain::{BackfillJob, JobId, JobKind, JobStatus, TypeSelection};
use crate::error::ServiceError;
use crate::persistence::{CatalogueStore, JobFilter, JobStore, JobUpdate};

/// Upper bound on the `FullHistorical` rolling window.
const MAX_HISTORICAL_DAYS: u32 = 30;

/// Orchestration layer for job lifecycle operations.
///
/// Stateless coordinator over the job store and source catalogue. Every
/// mutation follows the pattern: load → validate transition → update →
/// append audit log → return the fresh row.
#[derive(Debug, Clone)]
pub struct JobService {
    jobs: Arc<dyn JobStore>,
    catalogue: Arc<dyn CatalogueStore>,
}

impl JobService {
    /// Creates a new `JobService`.
    #[must_use]
    pub fn new(jobs: Arc<dyn JobStore>, catalogue: Arc<dyn CatalogueStore>) -> Self {
        Self { jobs, catalogue }
    }

    /// Validates and inserts a new job in `pending` state.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::SourceNotFound`] if the source is not in
    /// the catalogue, [`ServiceError::Validation`] on a disabled source
    /// or malformed configuration, and [`ServiceError::Store`] on
    /// storage failure.
    pub async fn create_job(
        &self,
        source_id: uuid::Uuid,
        kind: JobKind,
        requester: &str,
    ) -> Result<BackfillJob, ServiceError> {
        let source = self
            .catalogue
            .get_source(source_id)
            .await?
            .ok_or(ServiceError::SourceNotFound(source_id))?;
        if !source.is_enabled {
            return Err(ServiceError::Validation(format!(
                "source {} is disabled",
                source.name
            )));
        }
        validate_kind(&kind)?;

        let now = Utc::now();
        let job = BackfillJob {
            id: JobId::new(),
            source_id,
            kind,
            status: JobStatus::Pending,
            progress_cursor: None,
            created_by: requester.to_string(),
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        };
        self.jobs.insert_job(&job).await?;
        self.jobs
            .append_log(
                job.id,
                crate::domain::LogLevel::Info,
                &format!("job created by {requester}"),
                None,
            )
            .await?;

        tracing::info!(job_id = %job.id, source = %source.name, kind = job.kind.kind_str(), "backfill job created");
        Ok(job)
    }

    /// Lists jobs matching `filter`, newest first. Pure read.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<BackfillJob>, ServiceError> {
        self.jobs.list_jobs(filter).await
    }

    /// Loads a job by id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::JobNotFound`] if it does not exist and
    /// [`ServiceError::Store`] on storage failure.
    pub async fn get_job(&self, id: JobId) -> Result<BackfillJob, ServiceError> {
        self.jobs
            .get_job(id)
            .await?
            .ok_or(ServiceError::JobNotFound(id))
    }

    /// Pauses a running job. The in-flight executor observes the new
    /// status at its next chunk boundary and stops cooperatively.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::IllegalTransition`] unless the job is
    /// `running`.
    pub async fn pause_job(&self, id: JobId) -> Result<BackfillJob, ServiceError> {
        self.transition(id, JobStatus::Paused, "job paused").await
    }

    /// Moves a paused job back to `pending`. Does not start execution —
    /// the caller decides whether to launch an executor against it.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::IllegalTransition`] unless the job is
    /// `paused`.
    pub async fn resume_job(&self, id: JobId) -> Result<BackfillJob, ServiceError> {
        self.transition(id, JobStatus::Pending, "job resumed").await
    }

    /// Cancels a job. Irreversible; legal from any non-terminal state.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::IllegalTransition`] if the job is already
    /// terminal.
    pub async fn cancel_job(&self, id: JobId) -> Result<BackfillJob, ServiceError> {
        let job = self.get_job(id).await?;
        if !job.status.can_transition_to(JobStatus::Cancelled) {
            return Err(ServiceError::IllegalTransition {
                from: job.status,
                to: JobStatus::Cancelled,
            });
        }
        self.jobs
            .update_job(
                id,
                &JobUpdate {
                    status: Some(JobStatus::Cancelled),
                    started_at: None,
                    finished_at: Some(Utc::now()),
                },
            )
            .await?;
        self.jobs
            .append_log(id, crate::domain::LogLevel::Info, "job cancelled", None)
            .await?;
        tracing::info!(job_id = %id, from = %job.status, "backfill job cancelled");
        self.get_job(id).await
    }

    /// Deletes a terminal job and its logs.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Conflict`] while the job is still active
    /// and [`ServiceError::JobNotFound`] if it does not exist.
    pub async fn delete_job(&self, id: JobId) -> Result<(), ServiceError> {
        let job = self.get_job(id).await?;
        if !job.status.is_terminal() {
            return Err(ServiceError::Conflict(format!(
                "job {id} is {} and cannot be deleted",
                job.status
            )));
        }
        self.jobs.delete_job(id).await?;
        tracing::info!(job_id = %id, "backfill job deleted");
        Ok(())
    }

    /// Lists a job's logs, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::JobNotFound`] if the job does not exist
    /// and [`ServiceError::Store`] on storage failure.
    pub async fn job_logs(
        &self,
        id: JobId,
        level: Option<crate::domain::LogLevel>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<crate::domain::JobLog>, ServiceError> {
        // Surface 404 for unknown jobs rather than an empty page.
        let _ = self.get_job(id).await?;
        self.jobs.list_logs(id, level, limit, offset).await
    }

    async fn transition(
        &self,
        id: JobId,
        to: JobStatus,
        audit: &str,
    ) -> Result<BackfillJob, ServiceError> {
        let job = self.get_job(id).await?;
        if !job.status.can_transition_to(to) {
            return Err(ServiceError::IllegalTransition {
                from: job.status,
                to,
            });
        }
        self.jobs.update_job(id, &JobUpdate::status(to)).await?;
        self.jobs
            .append_log(id, crate::domain::LogLevel::Info, audit, None)
            .await?;
        tracing::info!(job_id = %id, from = %job.status, to = %to, "backfill job transition");
        self.get_job(id).await
    }
}

/// Creation-time validation of the tagged job configuration.
fn validate_kind(kind: &JobKind) -> Result<(), ServiceError> {
    if let TypeSelection::Only(types) = kind.types()
        && types.is_empty()
    {
        return Err(ServiceError::Validation(
            "type list must not be empty".to_string(),
        ));
    }
    match kind {
        JobKind::FullHistorical { days, .. } => {
            if *days == 0 || *days > MAX_HISTORICAL_DAYS {
                return Err(ServiceError::Validation(format!(
                    "days must be between 1 and {MAX_HISTORICAL_DAYS}, got {days}"
                )));
            }
        }
        JobKind::DateRange {
            start_date,
            end_date,
            ..
        } => {
            if start_date > end_date {
                return Err(ServiceError::Validation(format!(
                    "start_date {start_date} is after end_date {end_date}"
                )));
            }
        }
    }
    Ok(())
}
