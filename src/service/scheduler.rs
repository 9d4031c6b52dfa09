//! Automation scheduler: evaluates recurring automation definitions on
//! an externally-driven tick and dispatches due ones to type-keyed
//! handlers.
//!
//! The scheduler holds no state between ticks — each tick is a function
//! of the current time and the stored automation rows, with
//! `last_run_at` as the only re-fire guard.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};

use crate::domain::{Automation, HourField};
use crate::error::ServiceError;
use crate::persistence::AutomationStore;

/// An automation fired within this window of its `last_run_at` is
/// treated as already run, even if its hour field matches again.
const RERUN_SUPPRESSION_MINUTES: i64 = 50;

/// Execution context handed to a handler.
#[derive(Debug)]
pub struct AutomationContext<'a> {
    /// The automation being executed, including its `config` payload.
    pub automation: &'a Automation,
    /// Tick timestamp.
    pub now: DateTime<Utc>,
}

/// A type-keyed automation implementation.
#[async_trait]
pub trait AutomationHandler: Send + Sync {
    /// Executes the automation, returning a human-readable summary.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] on failure; the scheduler logs it and
    /// moves on to the next automation.
    async fn execute(&self, ctx: &AutomationContext<'_>) -> Result<String, ServiceError>;
}

/// Outcome counts for one tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, utoipa::ToSchema)]
pub struct TickReport {
    /// Automations whose handler ran successfully.
    pub dispatched: u32,
    /// Automations not due, suppressed, or without a usable schedule.
    pub skipped: u32,
    /// Automations whose handler returned an error.
    pub failed: u32,
}

/// Evaluates and dispatches automations. Driven by an external
/// time-based invoker; never self-scheduling.
pub struct AutomationScheduler {
    automations: Arc<dyn AutomationStore>,
    handlers: HashMap<String, Arc<dyn AutomationHandler>>,
}

impl std::fmt::Debug for AutomationScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutomationScheduler")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl AutomationScheduler {
    /// Creates a scheduler with an empty handler registry.
    #[must_use]
    pub fn new(automations: Arc<dyn AutomationStore>) -> Self {
        Self {
            automations,
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler for an automation type, replacing any
    /// previous registration for the same key.
    pub fn register(&mut self, automation_type: &str, handler: Arc<dyn AutomationHandler>) {
        self.handlers.insert(automation_type.to_string(), handler);
    }

    /// Runs one tick: loads active automations, decides which are due at
    /// `now`, and dispatches them. One automation's failure never blocks
    /// the others.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] only if the automation list
    /// itself cannot be loaded.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, ServiceError> {
        let automations = self.automations.list_active().await?;
        let mut report = TickReport::default();

        for automation in &automations {
            if !self.is_due(automation, now) {
                report.skipped += 1;
                continue;
            }

            let Some(handler) = self.handlers.get(&automation.automation_type) else {
                tracing::warn!(
                    automation = %automation.name,
                    automation_type = %automation.automation_type,
                    "no handler registered, skipping"
                );
                report.skipped += 1;
                continue;
            };

            let ctx = AutomationContext { automation, now };
            match handler.execute(&ctx).await {
                Ok(summary) => {
                    tracing::info!(automation = %automation.name, %summary, "automation ran");
                    self.automations.set_last_run(automation.id, now).await?;
                    report.dispatched += 1;
                }
                Err(e) => {
                    tracing::error!(automation = %automation.name, error = %e, "automation failed");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Whether `automation` should fire at `now`: its hour field matches
    /// and it has not already run inside the suppression window.
    fn is_due(&self, automation: &Automation, now: DateTime<Utc>) -> bool {
        let hour_field = match HourField::parse(&automation.schedule) {
            Ok(field) => field,
            Err(e) => {
                tracing::warn!(automation = %automation.name, error = %e, "skipping automation");
                return false;
            }
        };
        if !hour_field.matches(now.hour()) {
            return false;
        }
        if let Some(last_run) = automation.last_run_at
            && now - last_run < chrono::Duration::minutes(RERUN_SUPPRESSION_MINUTES)
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::MemoryStore;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    #[derive(Debug, Default)]
    struct CountingHandler {
        runs: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl AutomationHandler for CountingHandler {
        async fn execute(&self, _ctx: &AutomationContext<'_>) -> Result<String, ServiceError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(ServiceError::Internal("boom".to_string()));
            }
            Ok("done".to_string())
        }
    }

    fn automation(schedule: &str, last_run_at: Option<DateTime<Utc>>) -> Automation {
        let now = Utc::now();
        Automation {
            id: Uuid::new_v4(),
            name: "daily-sync".to_string(),
            automation_type: "price_sync".to_string(),
            schedule: schedule.to_string(),
            is_active: true,
            last_run_at,
            config: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, hour, 5, 0)
            .single()
            .unwrap_or_default()
    }

    async fn scheduler_with(
        store: &Arc<MemoryStore>,
        handler: Arc<CountingHandler>,
    ) -> AutomationScheduler {
        let mut scheduler = AutomationScheduler::new(Arc::clone(store) as Arc<dyn AutomationStore>);
        scheduler.register("price_sync", handler);
        scheduler
    }

    #[tokio::test]
    async fn wildcard_with_no_last_run_fires() {
        let store = Arc::new(MemoryStore::new());
        store.add_automation(automation("0 * * * *", None)).await;
        let handler = Arc::new(CountingHandler::default());
        let scheduler = scheduler_with(&store, Arc::clone(&handler)).await;

        let report = scheduler.tick(at_hour(13)).await.unwrap_or_default();
        assert_eq!(report.dispatched, 1);
        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn literal_hour_fires_only_at_that_hour() {
        let store = Arc::new(MemoryStore::new());
        store.add_automation(automation("0 8 * * *", None)).await;
        let handler = Arc::new(CountingHandler::default());
        let scheduler = scheduler_with(&store, Arc::clone(&handler)).await;

        let report = scheduler.tick(at_hour(9)).await.unwrap_or_default();
        assert_eq!(report.dispatched, 0);
        assert_eq!(report.skipped, 1);

        let report = scheduler.tick(at_hour(8)).await.unwrap_or_default();
        assert_eq!(report.dispatched, 1);
    }

    #[tokio::test]
    async fn recent_last_run_suppresses_refire() {
        let store = Arc::new(MemoryStore::new());
        let now = at_hour(8);
        store
            .add_automation(automation(
                "0 8 * * *",
                Some(now - chrono::Duration::minutes(30)),
            ))
            .await;
        let handler = Arc::new(CountingHandler::default());
        let scheduler = scheduler_with(&store, Arc::clone(&handler)).await;

        let report = scheduler.tick(now).await.unwrap_or_default();
        assert_eq!(report.dispatched, 0);
        assert_eq!(report.skipped, 1);
        assert_eq!(handler.runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stale_last_run_does_not_suppress() {
        let store = Arc::new(MemoryStore::new());
        let now = at_hour(8);
        store
            .add_automation(automation(
                "0 8 * * *",
                Some(now - chrono::Duration::minutes(55)),
            ))
            .await;
        let handler = Arc::new(CountingHandler::default());
        let scheduler = scheduler_with(&store, Arc::clone(&handler)).await;

        let report = scheduler.tick(now).await.unwrap_or_default();
        assert_eq!(report.dispatched, 1);
    }

    #[tokio::test]
    async fn successful_run_updates_last_run_at() {
        let store = Arc::new(MemoryStore::new());
        let auto = automation("0 * * * *", None);
        let id = auto.id;
        store.add_automation(auto).await;
        let handler = Arc::new(CountingHandler::default());
        let scheduler = scheduler_with(&store, handler).await;

        let now = at_hour(10);
        let _ = scheduler.tick(now).await;
        let stored = store.get_automation(id).await;
        assert_eq!(stored.and_then(|a| a.last_run_at), Some(now));
    }

    #[tokio::test]
    async fn handler_failure_neither_blocks_others_nor_updates_last_run() {
        let store = Arc::new(MemoryStore::new());
        let mut failing = automation("0 * * * *", None);
        failing.automation_type = "flaky".to_string();
        // Ensure the failing automation is evaluated first.
        failing.created_at -= chrono::Duration::hours(1);
        let failing_id = failing.id;
        store.add_automation(failing).await;
        store.add_automation(automation("0 * * * *", None)).await;

        let ok_handler = Arc::new(CountingHandler::default());
        let flaky_handler = Arc::new(CountingHandler {
            runs: AtomicU32::new(0),
            fail: true,
        });
        let mut scheduler =
            AutomationScheduler::new(Arc::clone(&store) as Arc<dyn AutomationStore>);
        scheduler.register("flaky", flaky_handler);
        scheduler.register(
            "price_sync",
            Arc::clone(&ok_handler) as Arc<dyn AutomationHandler>,
        );

        let report = scheduler.tick(at_hour(12)).await.unwrap_or_default();
        assert_eq!(report.failed, 1);
        assert_eq!(report.dispatched, 1);
        assert_eq!(ok_handler.runs.load(Ordering::SeqCst), 1);
        let stored = store.get_automation(failing_id).await;
        assert_eq!(stored.and_then(|a| a.last_run_at), None);
    }

    #[tokio::test]
    async fn malformed_schedule_is_skipped_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.add_automation(automation("0 */2 * * *", None)).await;
        store.add_automation(automation("0 * * * *", None)).await;
        let handler = Arc::new(CountingHandler::default());
        let scheduler = scheduler_with(&store, Arc::clone(&handler)).await;

        let report = scheduler.tick(at_hour(12)).await.unwrap_or_default();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.dispatched, 1);
    }

    #[tokio::test]
    async fn unregistered_type_is_skipped() {
        let store = Arc::new(MemoryStore::new());
        let mut auto = automation("0 * * * *", None);
        auto.automation_type = "unknown".to_string();
        store.add_automation(auto).await;
        let handler = Arc::new(CountingHandler::default());
        let scheduler = scheduler_with(&store, handler).await;

        let report = scheduler.tick(at_hour(12)).await.unwrap_or_default();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.dispatched, 0);
    }
}
