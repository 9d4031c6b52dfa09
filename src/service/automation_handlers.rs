//! Built-in automation handlers.
//!
//! The registry in [`super::scheduler::AutomationScheduler`] is the
//! seam where the wider platform plugs in its own automation types;
//! this service ships the data-hygiene handler it owns itself.

use std::sync::Arc;

use async_trait::async_trait;

use super::scheduler::{AutomationContext, AutomationHandler};
use crate::error::ServiceError;
use crate::persistence::SnapshotStore;

/// Retention applied when the automation's config does not set one.
const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Prunes aged non-backfilled snapshots.
///
/// Backfilled rows are never touched — they are the historical record
/// this whole subsystem exists to build. Config: `retention_days`
/// (integer, optional).
#[derive(Debug)]
pub struct SnapshotCleanupHandler {
    snapshots: Arc<dyn SnapshotStore>,
}

impl SnapshotCleanupHandler {
    /// Creates the handler over the given snapshot store.
    #[must_use]
    pub fn new(snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self { snapshots }
    }
}

#[async_trait]
impl AutomationHandler for SnapshotCleanupHandler {
    async fn execute(&self, ctx: &AutomationContext<'_>) -> Result<String, ServiceError> {
        let retention_days = ctx
            .automation
            .config
            .get("retention_days")
            .and_then(serde_json::Value::as_i64)
            .unwrap_or(DEFAULT_RETENTION_DAYS);
        let cutoff = ctx.now - chrono::Duration::days(retention_days);

        let removed = self.snapshots.delete_live_before(cutoff).await?;
        Ok(format!(
            "removed {removed} live snapshot(s) older than {retention_days} day(s)"
        ))
    }
}
