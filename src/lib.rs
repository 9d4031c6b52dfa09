//! # bullion-gateway
//!
//! REST control surface and background executor for historical
//! price-data backfill orchestration.
//!
//! This crate owns the hard part of a multi-source price platform: a
//! durable job state machine driven by a cooperatively-cancellable
//! executor that pages through third-party historical price APIs,
//! normalizes external codes to canonical ones, deduplicates at day
//! granularity, and persists canonical snapshots — plus the cron-style
//! scheduler for recurring automations. Catalogue administration,
//! authentication, and UI live elsewhere in the platform.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)
//!     │
//!     ├── REST Handlers (api/) ── AdminGate
//!     │
//!     ├── JobService (service/)          AutomationScheduler (service/)
//!     │       │                                  │
//!     ├── BackfillExecutor (spawned, fire-and-forget)
//!     │       ├── PriceFeed (reqwest + per-source rate limit)
//!     │       ├── Normalizer (catalogue mappings)
//!     │       └── Deduplicator (day-granularity)
//!     │
//!     └── Stores (persistence/): PostgreSQL | in-memory
//! ```
//!
//! The job row is the single source of truth: pause/resume/cancel are
//! writes to it, and the executor observes them by re-reading status at
//! chunk boundaries.

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
