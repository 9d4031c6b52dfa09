//! Source catalogue shapes: crawler sources and the normalization
//! mappings that translate their external codes to canonical ones.
//!
//! This subsystem only reads these rows; administration of the catalogue
//! lives elsewhere in the platform.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Authentication scheme for a source's API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceAuth {
    /// No authentication.
    None,
    /// API key sent in a configured header.
    ApiKey,
    /// `Authorization: Bearer <token>`.
    Bearer,
}

impl SourceAuth {
    /// Stable string form used in the database.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ApiKey => "api_key",
            Self::Bearer => "bearer",
        }
    }
}

impl std::str::FromStr for SourceAuth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "api_key" => Ok(Self::ApiKey),
            "bearer" => Ok(Self::Bearer),
            other => Err(format!("unknown auth type: {other}")),
        }
    }
}

/// A third-party price source as registered in the catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerSource {
    /// Unique source identifier.
    pub id: Uuid,
    /// Human-readable name.
    pub name: String,
    /// Base URL of the historical endpoint. The fetcher appends `date`
    /// (and `type` for typed chunks) query parameters.
    pub api_url: String,
    /// Response format discriminator (currently only `"json"`).
    pub api_type: String,
    /// Disabled sources are rejected at job creation.
    pub is_enabled: bool,
    /// Extra request headers sent verbatim.
    pub headers: HashMap<String, String>,
    /// Authentication scheme.
    pub auth_type: SourceAuth,
    /// Scheme-specific settings: `header`/`key` for `api_key`, `token`
    /// for `bearer`.
    pub auth_config: HashMap<String, String>,
    /// Request budget per minute, enforced client-side.
    pub rate_limit_per_minute: u32,
    /// Per-request timeout in seconds.
    pub timeout_seconds: u64,
    /// Relative priority among sources (higher first); advisory.
    pub priority: i32,
}

/// Maps a source's external product type code to a canonical one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeMapping {
    /// Source this mapping belongs to.
    pub source_id: Uuid,
    /// Code as published by the source.
    pub external_code: String,
    /// Canonical product type code.
    pub product_type_code: String,
    /// Disabled mappings behave as missing.
    pub is_enabled: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Maps a source's external zone code to a canonical province.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneMapping {
    /// Source this mapping belongs to.
    pub source_id: Uuid,
    /// Code as published by the source.
    pub external_code: String,
    /// Canonical province code.
    pub province_code: String,
    /// Disabled mappings behave as missing.
    pub is_enabled: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}
