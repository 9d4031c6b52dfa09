//! Shared DTO types used across multiple endpoints.

use serde::Deserialize;

/// Largest page any list endpoint serves.
const MAX_LIMIT: i64 = 200;

/// Offset/limit paging parameters for list endpoints.
#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct PageParams {
    /// Maximum rows to return (1–200). Defaults to 50.
    #[serde(default = "default_limit")]
    pub limit: i64,
    /// Rows to skip. Defaults to 0.
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

impl PageParams {
    /// Clamps the page to the allowed bounds.
    #[must_use]
    pub fn clamped(&self) -> Self {
        Self {
            limit: self.limit.clamp(1, MAX_LIMIT),
            offset: self.offset.max(0),
        }
    }

    /// Builds a clamped page from optional query values, applying the
    /// defaults for missing ones.
    #[must_use]
    pub fn from_options(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or_else(default_limit),
            offset: offset.unwrap_or(0),
        }
        .clamped()
    }
}

/// Simple acknowledgement body for lifecycle endpoints.
#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
}
