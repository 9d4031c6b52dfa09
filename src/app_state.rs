//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::api::auth::AdminGate;
use crate::service::{AutomationScheduler, BackfillExecutor, JobService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Job lifecycle service (create/list/transition/delete).
    pub job_service: Arc<JobService>,
    /// Background engine launched for `execute_immediately` jobs.
    pub executor: Arc<BackfillExecutor>,
    /// Automation scheduler driven by `POST /automations/tick`.
    pub scheduler: Arc<AutomationScheduler>,
    /// Admin capability gate for the control surface.
    pub admin_gate: Arc<dyn AdminGate>,
}
