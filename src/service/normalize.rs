//! Normalization: translates a source's external codes into canonical
//! ones via the catalogue mappings.
//!
//! Unmapped or disabled codes are a per-unit skip, never a chunk or job
//! failure — the caller is expected to log them at `warn`.

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::domain::{NormalizedPrice, RawPriceUnit};
use crate::error::ServiceError;
use crate::persistence::CatalogueStore;

/// Why a raw unit could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No enabled type mapping for the external code.
    UnmappedType(String),
    /// No enabled zone mapping for the external code.
    UnmappedZone(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnmappedType(code) => write!(f, "unmapped type code {code:?}"),
            Self::UnmappedZone(code) => write!(f, "unmapped zone code {code:?}"),
        }
    }
}

/// Outcome of normalizing one raw unit.
#[derive(Debug, Clone)]
pub enum NormalizeOutcome {
    /// Both lookups succeeded.
    Mapped(NormalizedPrice),
    /// The unit is skipped; carries the reason for the warn log.
    Skipped(SkipReason),
}

/// Translates raw units into canonical records using the catalogue's
/// type and zone mappings.
#[derive(Debug, Clone)]
pub struct Normalizer {
    catalogue: Arc<dyn CatalogueStore>,
}

impl Normalizer {
    /// Creates a normalizer over the given catalogue.
    #[must_use]
    pub fn new(catalogue: Arc<dyn CatalogueStore>) -> Self {
        Self { catalogue }
    }

    /// Normalizes one raw unit fetched for `day` from `source_id`.
    ///
    /// Historical records are attributed to midday UTC of their chunk's
    /// day so that day-granularity grouping is unambiguous regardless of
    /// the source's own timezone.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] if a mapping lookup fails at the
    /// storage layer. Unmapped codes are not errors.
    pub async fn normalize(
        &self,
        source_id: Uuid,
        unit: &RawPriceUnit,
        day: NaiveDate,
    ) -> Result<NormalizeOutcome, ServiceError> {
        let type_mapping = self
            .catalogue
            .type_mapping(source_id, &unit.external_type_code)
            .await?;
        let Some(type_mapping) = type_mapping.filter(|m| m.is_enabled) else {
            return Ok(NormalizeOutcome::Skipped(SkipReason::UnmappedType(
                unit.external_type_code.clone(),
            )));
        };

        let zone_mapping = self
            .catalogue
            .zone_mapping(source_id, &unit.external_zone_code)
            .await?;
        let Some(zone_mapping) = zone_mapping.filter(|m| m.is_enabled) else {
            return Ok(NormalizeOutcome::Skipped(SkipReason::UnmappedZone(
                unit.external_zone_code.clone(),
            )));
        };

        let created_at = day.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc();

        Ok(NormalizeOutcome::Mapped(NormalizedPrice {
            retailer_code: unit.retailer_code.trim().to_ascii_lowercase(),
            province_code: zone_mapping.province_code,
            product_type_code: type_mapping.product_type_code,
            buy_price: unit.buy_price,
            sell_price: unit.sell_price,
            unit: unit.unit.clone(),
            created_at,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{TypeMapping, ZoneMapping};
    use crate::persistence::memory::MemoryStore;
    use chrono::Utc;

    fn raw_unit() -> RawPriceUnit {
        RawPriceUnit {
            external_type_code: "SJC_1L".to_string(),
            external_zone_code: "HCM".to_string(),
            retailer_code: " SJC ".to_string(),
            buy_price: 100.0,
            sell_price: 105.0,
            unit: "tael".to_string(),
        }
    }

    async fn store_with_mappings(source_id: Uuid, type_enabled: bool) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .add_type_mapping(TypeMapping {
                source_id,
                external_code: "SJC_1L".to_string(),
                product_type_code: "bar_1l".to_string(),
                is_enabled: type_enabled,
                created_at: Utc::now(),
            })
            .await;
        store
            .add_zone_mapping(ZoneMapping {
                source_id,
                external_code: "HCM".to_string(),
                province_code: "ho_chi_minh".to_string(),
                is_enabled: true,
                created_at: Utc::now(),
            })
            .await;
        store
    }

    #[tokio::test]
    async fn maps_known_codes_and_canonicalizes_retailer() {
        let source_id = Uuid::new_v4();
        let store = store_with_mappings(source_id, true).await;
        let normalizer = Normalizer::new(store);

        let day = chrono::NaiveDate::from_ymd_opt(2024, 4, 2).unwrap_or_default();
        let outcome = normalizer.normalize(source_id, &raw_unit(), day).await;
        let Ok(NormalizeOutcome::Mapped(record)) = outcome else {
            unreachable!("expected mapped outcome");
        };
        assert_eq!(record.retailer_code, "sjc");
        assert_eq!(record.province_code, "ho_chi_minh");
        assert_eq!(record.product_type_code, "bar_1l");
        assert_eq!(record.day(), day);
    }

    #[tokio::test]
    async fn disabled_type_mapping_is_a_skip() {
        let source_id = Uuid::new_v4();
        let store = store_with_mappings(source_id, false).await;
        let normalizer = Normalizer::new(store);

        let day = chrono::NaiveDate::from_ymd_opt(2024, 4, 2).unwrap_or_default();
        let outcome = normalizer.normalize(source_id, &raw_unit(), day).await;
        assert!(matches!(
            outcome,
            Ok(NormalizeOutcome::Skipped(SkipReason::UnmappedType(_)))
        ));
    }

    #[tokio::test]
    async fn missing_zone_mapping_is_a_skip() {
        let source_id = Uuid::new_v4();
        let store = Arc::new(MemoryStore::new());
        store
            .add_type_mapping(TypeMapping {
                source_id,
                external_code: "SJC_1L".to_string(),
                product_type_code: "bar_1l".to_string(),
                is_enabled: true,
                created_at: Utc::now(),
            })
            .await;
        let normalizer = Normalizer::new(store);

        let day = chrono::NaiveDate::from_ymd_opt(2024, 4, 2).unwrap_or_default();
        let outcome = normalizer.normalize(source_id, &raw_unit(), day).await;
        assert!(matches!(
            outcome,
            Ok(NormalizeOutcome::Skipped(SkipReason::UnmappedZone(_)))
        ));
    }
}
