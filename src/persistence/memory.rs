//! In-memory implementation of the persistence layer.
//!
//! Backs the test suite and `STORE_BACKEND=memory` development runs.
//! Mirrors the PostgreSQL implementation's semantics — partial updates,
//! newest-first listings, conflict-tolerant snapshot inserts — so the
//! service layer behaves identically against either.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AutomationStore, CatalogueStore, JobFilter, JobStore, JobUpdate, SnapshotStore};
use crate::domain::{
    Automation, BackfillJob, ChunkKey, CrawlerSource, DedupKey, JobId, JobLog, LogLevel,
    NormalizedPrice, PriceSnapshot, TypeMapping, ZoneMapping,
};
use crate::error::ServiceError;

/// Default page size, matching the PostgreSQL store.
const DEFAULT_PAGE: i64 = 50;

/// In-memory store over `RwLock`-guarded maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<JobId, BackfillJob>>,
    logs: RwLock<Vec<JobLog>>,
    log_seq: AtomicI64,
    snapshots: RwLock<Vec<PriceSnapshot>>,
    snapshot_seq: AtomicI64,
    sources: RwLock<HashMap<Uuid, CrawlerSource>>,
    type_mappings: RwLock<HashMap<(Uuid, String), TypeMapping>>,
    zone_mappings: RwLock<HashMap<(Uuid, String), ZoneMapping>>,
    automations: RwLock<HashMap<Uuid, Automation>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a source in the catalogue.
    pub async fn add_source(&self, source: CrawlerSource) {
        self.sources.write().await.insert(source.id, source);
    }

    /// Registers a product type mapping.
    pub async fn add_type_mapping(&self, mapping: TypeMapping) {
        self.type_mappings
            .write()
            .await
            .insert((mapping.source_id, mapping.external_code.clone()), mapping);
    }

    /// Registers a zone mapping.
    pub async fn add_zone_mapping(&self, mapping: ZoneMapping) {
        self.zone_mappings
            .write()
            .await
            .insert((mapping.source_id, mapping.external_code.clone()), mapping);
    }

    /// Registers an automation definition.
    pub async fn add_automation(&self, automation: Automation) {
        self.automations
            .write()
            .await
            .insert(automation.id, automation);
    }

    /// Loads an automation by id.
    pub async fn get_automation(&self, id: Uuid) -> Option<Automation> {
        self.automations.read().await.get(&id).cloned()
    }

    /// All stored snapshots, in insertion order.
    pub async fn all_snapshots(&self) -> Vec<PriceSnapshot> {
        self.snapshots.read().await.clone()
    }

    /// Number of log lines recorded for a job, across all levels.
    pub async fn log_count(&self, id: JobId) -> usize {
        self.logs
            .read()
            .await
            .iter()
            .filter(|l| l.job_id == id)
            .count()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &BackfillJob) -> Result<(), ServiceError> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> Result<Option<BackfillJob>, ServiceError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<BackfillJob>, ServiceError> {
        let jobs = self.jobs.read().await;
        let mut matched: Vec<BackfillJob> = jobs
            .values()
            .filter(|j| filter.status.is_none_or(|s| j.status == s))
            .filter(|j| filter.source_id.is_none_or(|s| j.source_id == s))
            .filter(|j| {
                filter
                    .job_type
                    .as_deref()
                    .is_none_or(|t| j.kind.kind_str() == t)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let offset = usize::try_from(filter.offset.unwrap_or(0)).unwrap_or(0);
        let limit = usize::try_from(filter.limit.unwrap_or(DEFAULT_PAGE)).unwrap_or(0);
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }

    async fn update_job(&self, id: JobId, update: &JobUpdate) -> Result<(), ServiceError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(ServiceError::JobNotFound(id))?;
        if let Some(status) = update.status {
            job.status = status;
        }
        if job.started_at.is_none() {
            job.started_at = update.started_at;
        }
        if update.finished_at.is_some() {
            job.finished_at = update.finished_at;
        }
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn update_cursor(&self, id: JobId, cursor: &ChunkKey) -> Result<(), ServiceError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(ServiceError::JobNotFound(id))?;
        job.progress_cursor = Some(cursor.clone());
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn delete_job(&self, id: JobId) -> Result<(), ServiceError> {
        self.jobs.write().await.remove(&id);
        self.logs.write().await.retain(|l| l.job_id != id);
        Ok(())
    }

    async fn append_log(
        &self,
        id: JobId,
        level: LogLevel,
        message: &str,
        meta: Option<serde_json::Value>,
    ) -> Result<(), ServiceError> {
        let log = JobLog {
            id: self.log_seq.fetch_add(1, Ordering::Relaxed),
            job_id: id,
            level,
            message: message.to_string(),
            meta,
            created_at: Utc::now(),
        };
        self.logs.write().await.push(log);
        Ok(())
    }

    async fn list_logs(
        &self,
        id: JobId,
        level: Option<LogLevel>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<JobLog>, ServiceError> {
        let logs = self.logs.read().await;
        let mut matched: Vec<JobLog> = logs
            .iter()
            .filter(|l| l.job_id == id)
            .filter(|l| level.is_none_or(|lv| l.level == lv))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let offset = usize::try_from(offset).unwrap_or(0);
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(matched.into_iter().skip(offset).take(limit).collect())
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn backfilled_exists(&self, key: &DedupKey) -> Result<bool, ServiceError> {
        Ok(self.snapshots.read().await.iter().any(|s| {
            s.is_backfilled
                && s.created_at.date_naive() == key.day
                && s.retailer_code == key.retailer_code
                && s.province_code == key.province_code
                && s.product_type_code == key.product_type_code
        }))
    }

    async fn insert_backfilled(&self, records: &[NormalizedPrice]) -> Result<u64, ServiceError> {
        let mut written = 0u64;
        for record in records {
            // Same conflict tolerance as the partial unique index.
            if self.backfilled_exists(&record.dedup_key()).await? {
                continue;
            }
            let snapshot = PriceSnapshot {
                id: self.snapshot_seq.fetch_add(1, Ordering::Relaxed),
                retailer_code: record.retailer_code.clone(),
                province_code: record.province_code.clone(),
                product_type_code: record.product_type_code.clone(),
                buy_price: record.buy_price,
                sell_price: record.sell_price,
                unit: record.unit.clone(),
                created_at: record.created_at,
                is_backfilled: true,
            };
            self.snapshots.write().await.push(snapshot);
            written += 1;
        }
        Ok(written)
    }

    async fn delete_live_before(&self, before: DateTime<Utc>) -> Result<u64, ServiceError> {
        let mut snapshots = self.snapshots.write().await;
        let initial = snapshots.len();
        snapshots.retain(|s| s.is_backfilled || s.created_at >= before);
        Ok(u64::try_from(initial - snapshots.len()).unwrap_or(0))
    }
}

#[async_trait]
impl CatalogueStore for MemoryStore {
    async fn get_source(&self, id: Uuid) -> Result<Option<CrawlerSource>, ServiceError> {
        Ok(self.sources.read().await.get(&id).cloned())
    }

    async fn type_mapping(
        &self,
        source_id: Uuid,
        external_code: &str,
    ) -> Result<Option<TypeMapping>, ServiceError> {
        Ok(self
            .type_mappings
            .read()
            .await
            .get(&(source_id, external_code.to_string()))
            .cloned())
    }

    async fn zone_mapping(
        &self,
        source_id: Uuid,
        external_code: &str,
    ) -> Result<Option<ZoneMapping>, ServiceError> {
        Ok(self
            .zone_mappings
            .read()
            .await
            .get(&(source_id, external_code.to_string()))
            .cloned())
    }
}

#[async_trait]
impl AutomationStore for MemoryStore {
    async fn list_active(&self) -> Result<Vec<Automation>, ServiceError> {
        let automations = self.automations.read().await;
        let mut active: Vec<Automation> = automations
            .values()
            .filter(|a| a.is_active)
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(active)
    }

    async fn set_last_run(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), ServiceError> {
        let mut automations = self.automations.write().await;
        if let Some(automation) = automations.get_mut(&id) {
            automation.last_run_at = Some(at);
            automation.updated_at = at;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobKind, JobStatus, TypeSelection};

    fn make_job() -> BackfillJob {
        let now = Utc::now();
        BackfillJob {
            id: JobId::new(),
            source_id: Uuid::new_v4(),
            kind: JobKind::FullHistorical {
                days: 7,
                types: TypeSelection::All,
            },
            status: JobStatus::Pending,
            progress_cursor: None,
            created_by: "tester".to_string(),
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        }
    }

    #[tokio::test]
    async fn insert_and_get_job() {
        let store = MemoryStore::new();
        let job = make_job();
        let id = job.id;
        assert!(store.insert_job(&job).await.is_ok());
        let fetched = store.get_job(id).await.ok().flatten();
        assert!(fetched.is_some());
    }

    #[tokio::test]
    async fn update_job_is_partial() {
        let store = MemoryStore::new();
        let job = make_job();
        let id = job.id;
        let _ = store.insert_job(&job).await;

        let started = Utc::now();
        let update = JobUpdate {
            status: Some(JobStatus::Running),
            started_at: Some(started),
            finished_at: None,
        };
        assert!(store.update_job(id, &update).await.is_ok());

        let fetched = store.get_job(id).await.ok().flatten();
        let Some(fetched) = fetched else {
            unreachable!("job just inserted");
        };
        assert_eq!(fetched.status, JobStatus::Running);
        assert_eq!(fetched.started_at, Some(started));
        assert!(fetched.finished_at.is_none());

        // A later update must not clobber started_at.
        let update = JobUpdate {
            status: Some(JobStatus::Completed),
            started_at: Some(Utc::now()),
            finished_at: Some(Utc::now()),
        };
        let _ = store.update_job(id, &update).await;
        let fetched = store.get_job(id).await.ok().flatten();
        let Some(fetched) = fetched else {
            unreachable!("job just inserted");
        };
        assert_eq!(fetched.started_at, Some(started));
        assert!(fetched.finished_at.is_some());
    }

    #[tokio::test]
    async fn update_missing_job_is_not_found() {
        let store = MemoryStore::new();
        let result = store
            .update_job(JobId::new(), &JobUpdate::status(JobStatus::Running))
            .await;
        assert!(matches!(result, Err(ServiceError::JobNotFound(_))));
    }

    #[tokio::test]
    async fn list_jobs_filters_and_orders() {
        let store = MemoryStore::new();
        let mut a = make_job();
        a.created_at = Utc::now() - chrono::Duration::hours(1);
        let mut b = make_job();
        b.status = JobStatus::Running;
        let _ = store.insert_job(&a).await;
        let _ = store.insert_job(&b).await;

        let all = store.list_jobs(&JobFilter::default()).await.unwrap_or_default();
        assert_eq!(all.len(), 2);
        assert_eq!(all.first().map(|j| j.id), Some(b.id));

        let running = store
            .list_jobs(&JobFilter {
                status: Some(JobStatus::Running),
                ..JobFilter::default()
            })
            .await
            .unwrap_or_default();
        assert_eq!(running.len(), 1);
    }

    #[tokio::test]
    async fn delete_job_removes_logs() {
        let store = MemoryStore::new();
        let job = make_job();
        let id = job.id;
        let _ = store.insert_job(&job).await;
        let _ = store.append_log(id, LogLevel::Info, "hello", None).await;
        assert_eq!(store.log_count(id).await, 1);

        let _ = store.delete_job(id).await;
        assert_eq!(store.log_count(id).await, 0);
        assert!(store.get_job(id).await.unwrap_or_default().is_none());
    }

    #[tokio::test]
    async fn insert_backfilled_tolerates_existing_keys() {
        let store = MemoryStore::new();
        let record = NormalizedPrice {
            retailer_code: "sjc".to_string(),
            province_code: "hcm".to_string(),
            product_type_code: "bar_1l".to_string(),
            buy_price: 100.0,
            sell_price: 105.0,
            unit: "tael".to_string(),
            created_at: Utc::now(),
        };
        let first = store.insert_backfilled(&[record.clone()]).await;
        assert_eq!(first.ok(), Some(1));
        let second = store.insert_backfilled(&[record]).await;
        assert_eq!(second.ok(), Some(0));
        assert_eq!(store.all_snapshots().await.len(), 1);
    }
}
