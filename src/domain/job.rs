//! Backfill job model: status state machine, tagged job configuration,
//! durable progress cursor, and append-only job logs.
//!
//! The job row is the single source of truth for execution state. The
//! only fields the executor mutates after creation are `status`,
//! `progress_cursor`, and the lifecycle timestamps.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;

/// Lifecycle state of a backfill job.
///
/// ```text
/// pending ──► running ──► completed | failed
///    │           │ ▲
///    │           ▼ │ (resume + execute)
///    │         paused ──► pending
///    └───────────┴──────► cancelled
/// ```
///
/// `completed`, `failed`, and `cancelled` are terminal: no transition
/// out of them is ever legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but not yet picked up by an executor.
    Pending,
    /// An executor is driving the job.
    Running,
    /// Paused by an operator; resumable.
    Paused,
    /// All chunks processed (possibly with skips). Terminal.
    Completed,
    /// Aborted by an unrecoverable error. Terminal.
    Failed,
    /// Cancelled by an operator. Terminal.
    Cancelled,
}

impl JobStatus {
    /// Returns `true` for `completed`, `failed`, and `cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` if the state machine permits moving to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Running | Self::Cancelled),
            Self::Running => matches!(
                next,
                Self::Completed | Self::Failed | Self::Paused | Self::Cancelled
            ),
            Self::Paused => matches!(next, Self::Pending | Self::Cancelled),
            Self::Completed | Self::Failed | Self::Cancelled => false,
        }
    }

    /// Stable string form used in the database and query parameters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Product types a job covers: every type the source publishes, or an
/// explicit non-empty set.
///
/// Serialized as the literal string `"all"` or a JSON array of type
/// codes, matching the wire and storage format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(try_from = "TypesRepr", into = "TypesRepr")]
pub enum TypeSelection {
    /// Every product type the source publishes.
    All,
    /// An explicit, non-empty set of product type codes.
    Only(Vec<String>),
}

impl TypeSelection {
    /// The explicit type list, if one was given.
    #[must_use]
    pub fn listed(&self) -> Option<&[String]> {
        match self {
            Self::All => None,
            Self::Only(types) => Some(types),
        }
    }
}

/// Untagged wire representation backing [`TypeSelection`] serde.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum TypesRepr {
    Keyword(String),
    Listed(Vec<String>),
}

impl TryFrom<TypesRepr> for TypeSelection {
    type Error = String;

    fn try_from(repr: TypesRepr) -> Result<Self, Self::Error> {
        match repr {
            TypesRepr::Keyword(kw) if kw == "all" => Ok(Self::All),
            TypesRepr::Keyword(kw) => Err(format!("expected \"all\" or a type list, got {kw:?}")),
            TypesRepr::Listed(types) if types.is_empty() => {
                Err("type list must not be empty".to_string())
            }
            TypesRepr::Listed(types) => Ok(Self::Only(types)),
        }
    }
}

impl From<TypeSelection> for TypesRepr {
    fn from(sel: TypeSelection) -> Self {
        match sel {
            TypeSelection::All => Self::Keyword("all".to_string()),
            TypeSelection::Only(types) => Self::Listed(types),
        }
    }
}

/// Tagged job configuration, discriminated by the `job_type` string.
///
/// Validated exhaustively at creation time; the executor never re-checks
/// shape, only decomposes it into chunks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(tag = "job_type", content = "config", rename_all = "snake_case")]
pub enum JobKind {
    /// Rolling window: the `days` calendar days ending yesterday (UTC).
    FullHistorical {
        /// Window length in days, 1..=30.
        days: u32,
        /// Product types to cover.
        types: TypeSelection,
    },
    /// Explicit inclusive calendar span.
    DateRange {
        /// First day of the span.
        start_date: NaiveDate,
        /// Last day of the span, inclusive. Must be >= `start_date`.
        end_date: NaiveDate,
        /// Product types to cover.
        types: TypeSelection,
    },
}

impl JobKind {
    /// The `job_type` discriminator string as stored and filtered on.
    #[must_use]
    pub const fn kind_str(&self) -> &'static str {
        match self {
            Self::FullHistorical { .. } => "full_historical",
            Self::DateRange { .. } => "date_range",
        }
    }

    /// The type selection carried by either variant.
    #[must_use]
    pub const fn types(&self) -> &TypeSelection {
        match self {
            Self::FullHistorical { types, .. } | Self::DateRange { types, .. } => types,
        }
    }
}

/// Durable progress marker: the last successfully processed chunk.
///
/// Ordering is `(day, product_type)` with `None < Some`, matching the
/// executor's chunk order, so "strictly after the cursor" is a plain
/// `>` comparison.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, utoipa::ToSchema,
)]
pub struct ChunkKey {
    /// Calendar day the chunk covers.
    pub day: NaiveDate,
    /// Product type code when the job enumerates types; `None` for
    /// whole-day chunks.
    pub product_type: Option<String>,
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.product_type {
            Some(t) => write!(f, "{}/{t}", self.day),
            None => write!(f, "{}", self.day),
        }
    }
}

/// One historical ingestion request.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct BackfillJob {
    /// Unique job identifier.
    pub id: JobId,
    /// Source this job ingests from. Immutable after creation.
    pub source_id: uuid::Uuid,
    /// Tagged job configuration.
    #[serde(flatten)]
    pub kind: JobKind,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Last successfully processed chunk; `None` until the first chunk
    /// lands. Monotonically non-decreasing.
    pub progress_cursor: Option<ChunkKey>,
    /// Opaque identity of the requester (audit only).
    pub created_by: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Set once, when an executor first picks the job up.
    pub started_at: Option<DateTime<Utc>>,
    /// Set when the job reaches a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

/// Severity of a job log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Routine progress (chunk summaries, transitions).
    Info,
    /// Recoverable anomaly (unmapped code, skipped unit).
    Warn,
    /// Chunk-fatal or job-fatal failure.
    Error,
}

impl LogLevel {
    /// Stable string form used in the database and query parameters.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

/// Append-only log line attached to a job.
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct JobLog {
    /// Auto-increment row id.
    pub id: i64,
    /// Owning job.
    pub job_id: JobId,
    /// Severity.
    pub level: LogLevel,
    /// Human-readable message.
    pub message: String,
    /// Optional structured payload (counts, chunk keys).
    pub meta: Option<serde_json::Value>,
    /// Append timestamp.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    const ALL_STATUSES: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Paused,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    #[test]
    fn terminal_states_admit_no_transitions() {
        for from in [JobStatus::Completed, JobStatus::Failed, JobStatus::Cancelled] {
            for to in ALL_STATUSES {
                assert!(!from.can_transition_to(to), "{from} -> {to} must be illegal");
            }
        }
    }

    #[test]
    fn transition_matrix_matches_state_machine() {
        let legal = [
            (JobStatus::Pending, JobStatus::Running),
            (JobStatus::Pending, JobStatus::Cancelled),
            (JobStatus::Running, JobStatus::Completed),
            (JobStatus::Running, JobStatus::Failed),
            (JobStatus::Running, JobStatus::Paused),
            (JobStatus::Running, JobStatus::Cancelled),
            (JobStatus::Paused, JobStatus::Pending),
            (JobStatus::Paused, JobStatus::Cancelled),
        ];
        for from in ALL_STATUSES {
            for to in ALL_STATUSES {
                let expected = legal.contains(&(from, to));
                assert_eq!(from.can_transition_to(to), expected, "{from} -> {to}");
            }
        }
    }

    #[test]
    fn status_string_round_trip() {
        for status in ALL_STATUSES {
            let parsed: Result<JobStatus, _> = status.as_str().parse();
            assert_eq!(parsed, Ok(status));
        }
        assert!("sleeping".parse::<JobStatus>().is_err());
    }

    #[test]
    fn type_selection_accepts_all_keyword() {
        let sel: Result<TypeSelection, _> = serde_json::from_str("\"all\"");
        assert_eq!(sel.ok(), Some(TypeSelection::All));
    }

    #[test]
    fn type_selection_accepts_list() {
        let sel: Result<TypeSelection, _> = serde_json::from_str("[\"sjc\", \"ring\"]");
        assert_eq!(
            sel.ok(),
            Some(TypeSelection::Only(vec![
                "sjc".to_string(),
                "ring".to_string()
            ]))
        );
    }

    #[test]
    fn type_selection_rejects_empty_list_and_other_keywords() {
        assert!(serde_json::from_str::<TypeSelection>("[]").is_err());
        assert!(serde_json::from_str::<TypeSelection>("\"some\"").is_err());
    }

    #[test]
    fn job_kind_tagged_round_trip() {
        let kind = JobKind::DateRange {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 7).unwrap_or_default(),
            types: TypeSelection::All,
        };
        let json = serde_json::to_value(&kind).ok();
        let Some(json) = json else {
            panic!("serialization failed");
        };
        assert_eq!(json.get("job_type").and_then(|v| v.as_str()), Some("date_range"));
        let back: Result<JobKind, _> = serde_json::from_value(json);
        assert_eq!(back.ok(), Some(kind));
    }

    #[test]
    fn chunk_key_ordering_is_day_then_type() {
        let d1 = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap_or_default();
        let d2 = NaiveDate::from_ymd_opt(2024, 3, 2).unwrap_or_default();
        let whole_day = ChunkKey {
            day: d1,
            product_type: None,
        };
        let typed = ChunkKey {
            day: d1,
            product_type: Some("sjc".to_string()),
        };
        let next_day = ChunkKey {
            day: d2,
            product_type: None,
        };
        assert!(whole_day < typed);
        assert!(typed < next_day);
    }
}
