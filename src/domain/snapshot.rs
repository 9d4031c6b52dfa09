//! Price data shapes: raw units as fetched from a source, normalized
//! records keyed by canonical codes, and persisted snapshots.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// One unit of raw data as decoded from a source response, still keyed
/// by the source's own external codes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPriceUnit {
    /// Source-specific product type code (e.g. `"SJC_1L"`).
    pub external_type_code: String,
    /// Source-specific zone/branch code (e.g. `"HCM"`).
    pub external_zone_code: String,
    /// Retailer code as published by the source.
    pub retailer_code: String,
    /// Buy-side price.
    pub buy_price: f64,
    /// Sell-side price.
    pub sell_price: f64,
    /// Pricing unit (e.g. `"tael"`, `"chi"`).
    pub unit: String,
}

/// A raw unit after both mapping lookups succeeded: keyed entirely by
/// canonical codes and stamped with the calendar day it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedPrice {
    /// Canonical retailer code.
    pub retailer_code: String,
    /// Canonical province code.
    pub province_code: String,
    /// Canonical product type code.
    pub product_type_code: String,
    /// Buy-side price.
    pub buy_price: f64,
    /// Sell-side price.
    pub sell_price: f64,
    /// Pricing unit.
    pub unit: String,
    /// Timestamp the record is attributed to (midday UTC of the chunk's
    /// day for historical data).
    pub created_at: DateTime<Utc>,
}

impl NormalizedPrice {
    /// Calendar day this record is attributed to; the deduplication
    /// granularity for backfilled data.
    #[must_use]
    pub fn day(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    /// Grouping key for day-level deduplication.
    #[must_use]
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            day: self.day(),
            retailer_code: self.retailer_code.clone(),
            province_code: self.province_code.clone(),
            product_type_code: self.product_type_code.clone(),
        }
    }
}

/// Identity of a backfilled snapshot at day granularity.
///
/// The upstream historical APIs publish one aggregate value per day, so
/// this — not the exact timestamp — is the uniqueness contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    /// Calendar day.
    pub day: NaiveDate,
    /// Canonical retailer code.
    pub retailer_code: String,
    /// Canonical province code.
    pub province_code: String,
    /// Canonical product type code.
    pub product_type_code: String,
}

/// A persisted canonical price record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSnapshot {
    /// Auto-increment row id.
    pub id: i64,
    /// Canonical retailer code.
    pub retailer_code: String,
    /// Canonical province code.
    pub province_code: String,
    /// Canonical product type code.
    pub product_type_code: String,
    /// Buy-side price.
    pub buy_price: f64,
    /// Sell-side price.
    pub sell_price: f64,
    /// Pricing unit.
    pub unit: String,
    /// Timestamp the record is attributed to.
    pub created_at: DateTime<Utc>,
    /// `true` for records written by the backfill pipeline; at most one
    /// such record exists per `(retailer, province, type, day)`.
    pub is_backfilled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(day: u32) -> NormalizedPrice {
        NormalizedPrice {
            retailer_code: "sjc".to_string(),
            province_code: "hcm".to_string(),
            product_type_code: "bar_1l".to_string(),
            buy_price: 7_450_000.0,
            sell_price: 7_520_000.0,
            unit: "tael".to_string(),
            created_at: chrono::NaiveDate::from_ymd_opt(2024, 5, day)
                .unwrap_or_default()
                .and_hms_opt(12, 0, 0)
                .unwrap_or_default()
                .and_utc(),
        }
    }

    #[test]
    fn dedup_key_ignores_time_of_day() {
        let mut a = sample(3);
        let b = sample(3);
        a.created_at += chrono::Duration::hours(5);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }

    #[test]
    fn dedup_key_separates_days() {
        assert_ne!(sample(3).dedup_key(), sample(4).dedup_key());
    }
}
