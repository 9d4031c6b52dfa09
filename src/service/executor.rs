//! Backfill executor: drives one job from its durable cursor to a
//! terminal or externally-set state.
//!
//! Each run is a spawned task nobody awaits. Control is cooperative:
//! the executor re-reads the persisted job status between chunks, so a
//! pause or cancel recorded by the manager takes effect at the next
//! chunk boundary, never mid-fetch. Every outcome — completion, failure,
//! interruption — is observable only through the job store.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use futures_util::FutureExt;

use super::dedup::Deduplicator;
use super::fetch::{FetchError, PriceFeed};
use super::normalize::{NormalizeOutcome, Normalizer};
use crate::domain::{ChunkKey, CrawlerSource, JobId, JobKind, JobStatus, LogLevel, RawPriceUnit};
use crate::error::ServiceError;
use crate::persistence::{CatalogueStore, JobStore, JobUpdate, SnapshotStore};

/// Bounded retry budget per chunk fetch.
const MAX_FETCH_ATTEMPTS: u32 = 3;

/// Base delay for exponential retry backoff.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// The long-running engine behind every backfill job.
#[derive(Debug, Clone)]
pub struct BackfillExecutor {
    jobs: Arc<dyn JobStore>,
    catalogue: Arc<dyn CatalogueStore>,
    snapshots: Arc<dyn SnapshotStore>,
    feed: Arc<dyn PriceFeed>,
    normalizer: Normalizer,
    dedup: Deduplicator,
}

impl BackfillExecutor {
    /// Creates a new executor over the given stores and feed.
    #[must_use]
    pub fn new(
        jobs: Arc<dyn JobStore>,
        catalogue: Arc<dyn CatalogueStore>,
        snapshots: Arc<dyn SnapshotStore>,
        feed: Arc<dyn PriceFeed>,
    ) -> Self {
        let normalizer = Normalizer::new(Arc::clone(&catalogue));
        let dedup = Deduplicator::new(Arc::clone(&snapshots));
        Self {
            jobs,
            catalogue,
            snapshots,
            feed,
            normalizer,
            dedup,
        }
    }

    /// Launches a run as a detached task.
    ///
    /// The task is never awaited by callers; a run-level error or panic
    /// is converted into a `failed` job status and a terminal error log
    /// instead of propagating anywhere.
    pub fn spawn(executor: Arc<Self>, id: JobId) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            match AssertUnwindSafe(executor.run(id)).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(job_id = %id, error = %e, "executor run aborted");
                    executor.mark_failed(id, &format!("run aborted: {e}")).await;
                }
                Err(_) => {
                    tracing::error!(job_id = %id, "executor run panicked");
                    executor.mark_failed(id, "run panicked").await;
                }
            }
        })
    }

    /// Drives the job until it completes, a fatal error aborts the run,
    /// or an external pause/cancel is observed at a chunk boundary.
    ///
    /// Starting against a job that is not `pending` or `running` is an
    /// idempotent no-op, which makes accidental double-invocation
    /// harmless.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] when the job store itself fails;
    /// [`Self::spawn`] converts that into a `failed` status. Fetch and
    /// mapping problems are not errors — they are logged and skipped.
    pub async fn run(&self, id: JobId) -> Result<(), ServiceError> {
        let Some(job) = self.jobs.get_job(id).await? else {
            tracing::warn!(job_id = %id, "job vanished before execution");
            return Ok(());
        };
        if !matches!(job.status, JobStatus::Pending | JobStatus::Running) {
            tracing::info!(job_id = %id, status = %job.status, "job not executable, skipping run");
            return Ok(());
        }

        self.jobs
            .update_job(
                id,
                &JobUpdate {
                    status: Some(JobStatus::Running),
                    started_at: Some(Utc::now()),
                    finished_at: None,
                },
            )
            .await?;

        let Some(source) = self.catalogue.get_source(job.source_id).await? else {
            self.jobs
                .update_job(
                    id,
                    &JobUpdate {
                        status: Some(JobStatus::Failed),
                        started_at: None,
                        finished_at: Some(Utc::now()),
                    },
                )
                .await?;
            self.jobs
                .append_log(
                    id,
                    LogLevel::Error,
                    &format!("source {} missing from catalogue", job.source_id),
                    None,
                )
                .await?;
            return Ok(());
        };

        let chunks = chunk_plan(
            &job.kind,
            job.progress_cursor.as_ref(),
            Utc::now().date_naive(),
        );
        self.jobs
            .append_log(
                id,
                LogLevel::Info,
                &format!("starting backfill of {} chunk(s)", chunks.len()),
                None,
            )
            .await?;

        for chunk in &chunks {
            // The persisted status is authoritative; never cache it
            // across chunks.
            let Some(current) = self.jobs.get_job(id).await? else {
                tracing::warn!(job_id = %id, "job row disappeared mid-run, stopping");
                return Ok(());
            };
            if current.status != JobStatus::Running {
                self.jobs
                    .append_log(
                        id,
                        LogLevel::Info,
                        &format!("execution stopped: job is {}", current.status),
                        None,
                    )
                    .await?;
                return Ok(());
            }

            self.process_chunk(id, &source, chunk).await?;
            self.jobs.update_cursor(id, chunk).await?;
        }

        self.jobs
            .update_job(
                id,
                &JobUpdate {
                    status: Some(JobStatus::Completed),
                    started_at: None,
                    finished_at: Some(Utc::now()),
                },
            )
            .await?;
        self.jobs
            .append_log(id, LogLevel::Info, "backfill completed", None)
            .await?;
        tracing::info!(job_id = %id, chunks = chunks.len(), "backfill completed");
        Ok(())
    }

    /// Fetch, normalize, deduplicate, and persist one chunk. A chunk
    /// that cannot be fetched is logged and skipped; the job continues.
    async fn process_chunk(
        &self,
        id: JobId,
        source: &CrawlerSource,
        chunk: &ChunkKey,
    ) -> Result<(), ServiceError> {
        let raw = match self.fetch_with_retry(source, chunk).await {
            Ok(raw) => raw,
            Err(e) => {
                self.jobs
                    .append_log(
                        id,
                        LogLevel::Error,
                        &format!("chunk {chunk} skipped after retries: {e}"),
                        None,
                    )
                    .await?;
                return Ok(());
            }
        };

        let mut mapped = Vec::with_capacity(raw.len());
        let mut skipped = 0usize;
        for unit in &raw {
            match self.normalizer.normalize(source.id, unit, chunk.day).await? {
                NormalizeOutcome::Mapped(record) => mapped.push(record),
                NormalizeOutcome::Skipped(reason) => {
                    skipped += 1;
                    self.jobs
                        .append_log(
                            id,
                            LogLevel::Warn,
                            &format!("chunk {chunk}: unit skipped, {reason}"),
                            None,
                        )
                        .await?;
                }
            }
        }

        let outcome = self.dedup.filter_duplicates_batch(mapped).await?;
        let saved = self.snapshots.insert_backfilled(&outcome.unique).await?;

        self.jobs
            .append_log(
                id,
                LogLevel::Info,
                &format!(
                    "chunk {chunk}: saved {saved}, duplicate {}, skipped {skipped}",
                    outcome.duplicates.len()
                ),
                Some(serde_json::json!({
                    "chunk": chunk.to_string(),
                    "saved": saved,
                    "duplicates": outcome.duplicates.len(),
                    "skipped": skipped,
                })),
            )
            .await?;
        Ok(())
    }

    async fn fetch_with_retry(
        &self,
        source: &CrawlerSource,
        chunk: &ChunkKey,
    ) -> Result<Vec<RawPriceUnit>, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            match self
                .feed
                .fetch_chunk(source, chunk.day, chunk.product_type.as_deref())
                .await
            {
                Ok(units) => return Ok(units),
                Err(e) if e.is_transient() && attempt + 1 < MAX_FETCH_ATTEMPTS => {
                    let delay = RETRY_BASE_DELAY * 2u32.saturating_pow(attempt);
                    tracing::warn!(
                        source = %source.name,
                        chunk = %chunk,
                        attempt,
                        error = %e,
                        "transient fetch failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Best-effort conversion of a run-level failure into job state.
    /// Called outside the normal result path, so store errors here can
    /// only be traced, not persisted.
    async fn mark_failed(&self, id: JobId, reason: &str) {
        let update = JobUpdate {
            status: Some(JobStatus::Failed),
            started_at: None,
            finished_at: Some(Utc::now()),
        };
        if let Err(e) = self.jobs.update_job(id, &update).await {
            tracing::error!(job_id = %id, error = %e, "could not record job failure");
        }
        if let Err(e) = self.jobs.append_log(id, LogLevel::Error, reason, None).await {
            tracing::error!(job_id = %id, error = %e, "could not append failure log");
        }
    }
}

/// Decomposes a job's span into ordered chunks strictly after `cursor`.
///
/// One chunk per calendar day, or one per day and type when types are
/// enumerated; enumerated types are visited in lexicographic order so
/// chunk order agrees with [`ChunkKey`] ordering and cursor comparison
/// stays a plain `>`.
fn chunk_plan(kind: &JobKind, cursor: Option<&ChunkKey>, today: NaiveDate) -> Vec<ChunkKey> {
    let (start, end, types) = match kind {
        JobKind::FullHistorical { days, types } => {
            // The current day's upstream aggregate is still moving;
            // the window ends yesterday.
            let end = today - chrono::Duration::days(1);
            let start = end - chrono::Duration::days(i64::from(*days) - 1);
            (start, end, types)
        }
        JobKind::DateRange {
            start_date,
            end_date,
            types,
        } => (*start_date, *end_date, types),
    };

    let type_order: Option<Vec<String>> = types.listed().map(|listed| {
        let mut sorted = listed.to_vec();
        sorted.sort();
        sorted
    });

    let mut chunks = Vec::new();
    let mut day = start;
    while day <= end {
        match &type_order {
            None => chunks.push(ChunkKey {
                day,
                product_type: None,
            }),
            Some(order) => {
                for t in order {
                    chunks.push(ChunkKey {
                        day,
                        product_type: Some(t.clone()),
                    });
                }
            }
        }
        day += chrono::Duration::days(1);
    }

    if let Some(cursor) = cursor {
        chunks.retain(|c| c > cursor);
    }
    chunks
}
