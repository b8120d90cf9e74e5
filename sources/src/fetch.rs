//! JSON fetch seam and its HTTP implementation.
//!
//! Adapters only depend on [`JsonFetcher`]; the concrete transport is chosen
//! by whoever constructs them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue};
use serde_json::Value;
use tokio::sync::Semaphore;
use url::Url;

use crate::error::{Result, SourceError};

/// Default per-fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on concurrent upstream requests.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 16;

/// Given a location, return its parsed JSON body or fail.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    async fn fetch_json(&self, href: &Url) -> Result<Value>;
}

/// Resolve `relative` against `base` with URL base-resolution rules.
///
/// A base without a trailing slash resolves relative to its parent, so
/// `https://host/app` + `x.json` is `https://host/x.json`.
pub fn resolve_location(base: &str, relative: &str) -> Result<Url> {
    Url::parse(base)
        .and_then(|base_url| base_url.join(relative))
        .map_err(|source| SourceError::InvalidLocation {
            base: base.to_string(),
            relative: relative.to_string(),
            source,
        })
}

/// Settings for [`HttpJsonFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub timeout: Duration,
    pub max_concurrent_fetches: usize,
    pub user_agent: String,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_FETCH_TIMEOUT,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
            user_agent: format!("mfe-gateway/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// [`JsonFetcher`] backed by a shared `reqwest::Client`.
///
/// Non-2xx responses and non-JSON bodies are errors. At most
/// `max_concurrent_fetches` requests are in flight at once across every
/// caller sharing this fetcher.
pub struct HttpJsonFetcher {
    client: reqwest::Client,
    permits: Arc<Semaphore>,
}

impl HttpJsonFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|source| SourceError::ClientInit { source })?;
        Ok(Self::with_client(client, config.max_concurrent_fetches))
    }

    /// Wrap an existing client. A zero limit is treated as one.
    pub fn with_client(client: reqwest::Client, max_concurrent_fetches: usize) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(max_concurrent_fetches.max(1))),
        }
    }
}

#[async_trait]
impl JsonFetcher for HttpJsonFetcher {
    async fn fetch_json(&self, href: &Url) -> Result<Value> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| SourceError::Closed {
                href: href.to_string(),
            })?;

        let started = Instant::now();
        let response = self
            .client
            .get(href.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(|source| SourceError::Transport {
                href: href.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                href: href.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| SourceError::Transport {
                href: href.to_string(),
                source,
            })?;

        let value = serde_json::from_slice(&body).map_err(|source| SourceError::Decode {
            href: href.to_string(),
            source,
        })?;

        tracing::debug!(
            href = %href,
            status = status.as_u16(),
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched upstream document"
        );
        Ok(value)
    }
}
