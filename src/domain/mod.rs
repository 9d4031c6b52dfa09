//! Domain layer: job model and state machine, price data shapes,
//! source catalogue types, and automation definitions.
//!
//! This module contains the server-side domain model: job identity, the
//! job lifecycle state machine with its durable progress cursor, raw and
//! normalized price records, the read-only source catalogue shapes, and
//! recurring automation definitions.

pub mod automation;
pub mod job;
pub mod job_id;
pub mod snapshot;
pub mod source;

pub use automation::{Automation, HourField};
pub use job::{BackfillJob, ChunkKey, JobKind, JobLog, JobStatus, LogLevel, TypeSelection};
pub use job_id::JobId;
pub use snapshot::{DedupKey, NormalizedPrice, PriceSnapshot, RawPriceUnit};
pub use source::{CrawlerSource, SourceAuth, TypeMapping, ZoneMapping};
