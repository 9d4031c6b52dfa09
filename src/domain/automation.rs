//! Recurring automation definitions and the restricted schedule subset
//! the scheduler evaluates.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A recurring automation definition.
///
/// Created by an administrator, read by the scheduler each tick; the
/// scheduler's only write is `last_run_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    /// Unique automation identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Handler key this automation dispatches to (e.g. `"price_sync"`).
    pub automation_type: String,
    /// Five-field cron-like string; only the hour field is evaluated.
    pub schedule: String,
    /// Inactive automations are never evaluated.
    pub is_active: bool,
    /// When the scheduler last ran this automation.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Handler-specific settings.
    pub config: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Parsed hour field of an automation schedule.
///
/// The supported subset is deliberate: `*` (every hour) or a literal
/// hour 0–23. Minute-level granularity is not supported; the external
/// invoker ticks at most once per window and [`super::Automation::last_run_at`]
/// suppresses double fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HourField {
    /// Matches every hour.
    Any,
    /// Matches one literal hour, 0–23.
    At(u32),
}

impl HourField {
    /// Parses the hour field out of a five-field cron string
    /// (`min hour dom mon dow`).
    ///
    /// # Errors
    ///
    /// Returns a [`ScheduleParseError`] when the string has no hour
    /// field, the field is not `*` or an integer, or the hour is out of
    /// range.
    pub fn parse(schedule: &str) -> Result<Self, ScheduleParseError> {
        let mut fields = schedule.split_whitespace();
        let _minute = fields
            .next()
            .ok_or_else(|| ScheduleParseError(schedule.to_string()))?;
        let hour = fields
            .next()
            .ok_or_else(|| ScheduleParseError(schedule.to_string()))?;

        if hour == "*" {
            return Ok(Self::Any);
        }
        match hour.parse::<u32>() {
            Ok(h) if h <= 23 => Ok(Self::At(h)),
            _ => Err(ScheduleParseError(schedule.to_string())),
        }
    }

    /// Whether an automation with this hour field is due at `hour`.
    #[must_use]
    pub const fn matches(self, hour: u32) -> bool {
        match self {
            Self::Any => true,
            Self::At(h) => h == hour,
        }
    }
}

/// A schedule string the scheduler cannot evaluate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleParseError(
    /// The offending schedule expression.
    pub String,
);

impl fmt::Display for ScheduleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported schedule expression: {:?}", self.0)
    }
}

impl std::error::Error for ScheduleParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wildcard_hour() {
        assert_eq!(HourField::parse("0 * * * *"), Ok(HourField::Any));
    }

    #[test]
    fn parses_literal_hour() {
        assert_eq!(HourField::parse("30 8 * * *"), Ok(HourField::At(8)));
        assert_eq!(HourField::parse("0 23 * * *"), Ok(HourField::At(23)));
    }

    #[test]
    fn rejects_out_of_range_and_unsupported_syntax() {
        assert!(HourField::parse("0 24 * * *").is_err());
        assert!(HourField::parse("0 */2 * * *").is_err());
        assert!(HourField::parse("0 8,12 * * *").is_err());
        assert!(HourField::parse("").is_err());
        assert!(HourField::parse("0").is_err());
    }

    #[test]
    fn wildcard_matches_every_hour() {
        for h in 0..24 {
            assert!(HourField::Any.matches(h));
        }
    }

    #[test]
    fn literal_matches_only_its_hour() {
        assert!(HourField::At(8).matches(8));
        assert!(!HourField::At(8).matches(9));
    }
}
