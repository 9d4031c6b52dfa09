//! Day-granularity deduplication of normalized price records.
//!
//! The upstream historical APIs publish one aggregate value per day, so
//! uniqueness is enforced on `(retailer, province, product type, day)`
//! against backfilled snapshots — exact-timestamp matching would never
//! deduplicate anything.

use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::{DedupKey, NormalizedPrice};
use crate::error::ServiceError;
use crate::persistence::SnapshotStore;

/// Result of splitting a batch into unique and duplicate records.
#[derive(Debug, Default)]
pub struct FilterOutcome {
    /// Records with no existing backfilled snapshot for their key.
    pub unique: Vec<NormalizedPrice>,
    /// Records whose key already exists (in the store or earlier in the
    /// same batch).
    pub duplicates: Vec<NormalizedPrice>,
}

/// Decides whether normalized records already exist at day granularity.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    snapshots: Arc<dyn SnapshotStore>,
}

impl Deduplicator {
    /// Creates a deduplicator over the given snapshot store.
    #[must_use]
    pub fn new(snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self { snapshots }
    }

    /// Whether a backfilled snapshot already exists for this record's
    /// `(retailer, province, product type, day)` key.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    pub async fn is_duplicate(&self, record: &NormalizedPrice) -> Result<bool, ServiceError> {
        self.snapshots.backfilled_exists(&record.dedup_key()).await
    }

    /// Splits `records` by checking each against the store individually.
    /// Suitable for small batches.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    pub async fn filter_duplicates(
        &self,
        records: Vec<NormalizedPrice>,
    ) -> Result<FilterOutcome, ServiceError> {
        let mut outcome = FilterOutcome::default();
        for record in records {
            if self.is_duplicate(&record).await? {
                outcome.duplicates.push(record);
            } else {
                outcome.unique.push(record);
            }
        }
        Ok(outcome)
    }

    /// Splits `records` with one existence check per distinct key.
    ///
    /// Accepting a record marks its key as existing for the remainder of
    /// the batch, so two records sharing a key within one batch cannot
    /// both come out unique.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] on storage failure.
    pub async fn filter_duplicates_batch(
        &self,
        records: Vec<NormalizedPrice>,
    ) -> Result<FilterOutcome, ServiceError> {
        let mut exists: HashMap<DedupKey, bool> = HashMap::new();
        for record in &records {
            let key = record.dedup_key();
            if !exists.contains_key(&key) {
                let found = self.snapshots.backfilled_exists(&key).await?;
                exists.insert(key, found);
            }
        }

        let mut outcome = FilterOutcome::default();
        for record in records {
            let key = record.dedup_key();
            if exists.get(&key).copied().unwrap_or(false) {
                outcome.duplicates.push(record);
            } else {
                exists.insert(key, true);
                outcome.unique.push(record);
            }
        }
        Ok(outcome)
    }
}
