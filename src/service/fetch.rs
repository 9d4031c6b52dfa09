//! Outbound source fetches: the [`PriceFeed`] seam and its HTTP
//! implementation with per-source rate limiting.
//!
//! The executor only sees [`PriceFeed`]; tests script it with fakes.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::{CrawlerSource, RawPriceUnit, SourceAuth};

/// Fallback quota when a source row carries a zero rate limit.
const DEFAULT_QUOTA_PER_MINUTE: NonZeroU32 = nonzero!(60u32);

/// Failure while fetching a chunk from a source.
///
/// Never surfaced through the control API — the executor retries
/// transient variants with backoff, then logs and skips the chunk.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request exceeded the source's configured timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure (DNS, refused, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status from the source.
    #[error("source returned status {0}")]
    Status(u16),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The source row is unusable (malformed URL, header, or auth config).
    #[error("invalid source configuration: {0}")]
    InvalidSource(String),
}

impl FetchError {
    /// Whether retrying the same request can plausibly succeed.
    /// 4xx statuses and broken source configuration cannot.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) | Self::Decode(_) => true,
            Self::Status(code) => *code >= 500,
            Self::InvalidSource(_) => false,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_decode() {
            Self::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Status(status.as_u16())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

/// Source of historical price data for one chunk.
#[async_trait]
pub trait PriceFeed: Send + Sync + std::fmt::Debug {
    /// Fetches the raw units for one calendar day, optionally narrowed
    /// to a single product type.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] describing the failure; see
    /// [`FetchError::is_transient`] for retry semantics.
    async fn fetch_chunk(
        &self,
        source: &CrawlerSource,
        day: NaiveDate,
        product_type: Option<&str>,
    ) -> Result<Vec<RawPriceUnit>, FetchError>;
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Envelope the historical endpoints wrap their day payload in.
#[derive(Debug, Deserialize)]
struct FeedResponse {
    data: Vec<RawPriceUnit>,
}

/// HTTP implementation of [`PriceFeed`].
///
/// Holds one `governor` limiter per source, built lazily from the
/// source's `rate_limit_per_minute`. Limiters are shared across
/// concurrently running jobs against the same source, so the per-source
/// budget holds regardless of job concurrency.
pub struct HttpPriceFeed {
    client: reqwest::Client,
    limiters: Mutex<HashMap<Uuid, Arc<DirectLimiter>>>,
}

impl std::fmt::Debug for HttpPriceFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpPriceFeed").finish_non_exhaustive()
    }
}

impl HttpPriceFeed {
    /// Creates a feed with a default client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            limiters: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for(&self, source: &CrawlerSource) -> Arc<DirectLimiter> {
        let mut limiters = self.limiters.lock().await;
        Arc::clone(limiters.entry(source.id).or_insert_with(|| {
            let quota = NonZeroU32::new(source.rate_limit_per_minute)
                .unwrap_or(DEFAULT_QUOTA_PER_MINUTE);
            Arc::new(RateLimiter::direct(Quota::per_minute(quota)))
        }))
    }

    fn request_headers(source: &CrawlerSource) -> Result<HeaderMap, FetchError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &source.headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| FetchError::InvalidSource(e.to_string()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| FetchError::InvalidSource(e.to_string()))?;
            headers.insert(name, value);
        }

        match source.auth_type {
            SourceAuth::None => {}
            SourceAuth::ApiKey => {
                let header = source
                    .auth_config
                    .get("header")
                    .map_or("x-api-key", String::as_str);
                let key = source.auth_config.get("key").ok_or_else(|| {
                    FetchError::InvalidSource("api_key auth without key".to_string())
                })?;
                headers.insert(
                    HeaderName::try_from(header)
                        .map_err(|e| FetchError::InvalidSource(e.to_string()))?,
                    HeaderValue::from_str(key)
                        .map_err(|e| FetchError::InvalidSource(e.to_string()))?,
                );
            }
            SourceAuth::Bearer => {
                let token = source.auth_config.get("token").ok_or_else(|| {
                    FetchError::InvalidSource("bearer auth without token".to_string())
                })?;
                headers.insert(
                    reqwest::header::AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {token}"))
                        .map_err(|e| FetchError::InvalidSource(e.to_string()))?,
                );
            }
        }
        Ok(headers)
    }
}

impl Default for HttpPriceFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PriceFeed for HttpPriceFeed {
    async fn fetch_chunk(
        &self,
        source: &CrawlerSource,
        day: NaiveDate,
        product_type: Option<&str>,
    ) -> Result<Vec<RawPriceUnit>, FetchError> {
        let headers = Self::request_headers(source)?;

        // Wait for budget before the request hits the wire.
        self.limiter_for(source).await.until_ready().await;

        let mut query: Vec<(&str, String)> = vec![("date", day.to_string())];
        if let Some(t) = product_type {
            query.push(("type", t.to_string()));
        }

        let response = self
            .client
            .get(&source.api_url)
            .headers(headers)
            .query(&query)
            .timeout(Duration::from_secs(source.timeout_seconds))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.json::<FeedResponse>().await?;
        Ok(body.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_source(auth_type: SourceAuth, auth_config: &[(&str, &str)]) -> CrawlerSource {
        CrawlerSource {
            id: Uuid::new_v4(),
            name: "test".to_string(),
            api_url: "http://localhost/api".to_string(),
            api_type: "json".to_string(),
            is_enabled: true,
            headers: HashMap::new(),
            auth_type,
            auth_config: auth_config
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            rate_limit_per_minute: 60,
            timeout_seconds: 5,
            priority: 0,
        }
    }

    #[test]
    fn transient_classification() {
        assert!(FetchError::Timeout.is_transient());
        assert!(FetchError::Status(503).is_transient());
        assert!(!FetchError::Status(404).is_transient());
        assert!(!FetchError::InvalidSource(String::new()).is_transient());
    }

    #[test]
    fn bearer_auth_sets_authorization_header() {
        let source = make_source(SourceAuth::Bearer, &[("token", "s3cret")]);
        let headers = HttpPriceFeed::request_headers(&source).ok();
        let Some(headers) = headers else {
            unreachable!("header build failed");
        };
        assert_eq!(
            headers
                .get(reqwest::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok()),
            Some("Bearer s3cret")
        );
    }

    #[test]
    fn api_key_auth_uses_configured_header() {
        let source = make_source(SourceAuth::ApiKey, &[("header", "x-feed-key"), ("key", "k1")]);
        let headers = HttpPriceFeed::request_headers(&source).ok();
        let Some(headers) = headers else {
            unreachable!("header build failed");
        };
        assert_eq!(
            headers.get("x-feed-key").and_then(|v| v.to_str().ok()),
            Some("k1")
        );
    }

    #[test]
    fn api_key_auth_without_key_is_invalid() {
        let source = make_source(SourceAuth::ApiKey, &[]);
        assert!(matches!(
            HttpPriceFeed::request_headers(&source),
            Err(FetchError::InvalidSource(_))
        ));
    }
}
