//! Service layer: business logic orchestration.
//!
//! [`JobService`] is the control surface over the job state machine;
//! [`BackfillExecutor`] is the background engine that drives jobs;
//! [`AutomationScheduler`] evaluates recurring automations on an
//! external tick. The [`fetch::PriceFeed`], [`normalize::Normalizer`],
//! and [`dedup::Deduplicator`] pieces make up the executor's pipeline.

pub mod automation_handlers;
pub mod dedup;
pub mod executor;
pub mod fetch;
pub mod job_service;
pub mod normalize;
pub mod scheduler;

pub use dedup::Deduplicator;
pub use executor::BackfillExecutor;
pub use fetch::{HttpPriceFeed, PriceFeed};
pub use job_service::JobService;
pub use normalize::Normalizer;
pub use scheduler::AutomationScheduler;
