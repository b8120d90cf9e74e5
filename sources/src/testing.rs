//! In-memory [`JsonFetcher`] for tests.
//!
//! Serves canned documents by href and counts every request so callers can
//! assert which upstream fetches a resolution actually issued.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::error::{Result, SourceError};
use crate::fetch::JsonFetcher;

#[derive(Debug, Clone)]
enum Canned {
    Json(Value),
    Status(u16),
    Malformed(String),
}

/// Canned-response fetcher. Unknown hrefs answer 404.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    documents: Mutex<HashMap<String, Canned>>,
    counts: Mutex<HashMap<String, usize>>,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(self, href: &str, document: Value) -> Self {
        self.insert(href, Canned::Json(document));
        self
    }

    pub fn with_status(self, href: &str, status: u16) -> Self {
        self.insert(href, Canned::Status(status));
        self
    }

    /// Serve a body that is not JSON.
    pub fn with_malformed(self, href: &str, body: &str) -> Self {
        self.insert(href, Canned::Malformed(body.to_string()));
        self
    }

    pub fn fetch_count(&self, href: &str) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(href)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .sum()
    }

    /// Every href requested at least once, sorted.
    pub fn fetched_hrefs(&self) -> Vec<String> {
        let mut hrefs: Vec<_> = self
            .counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        hrefs.sort();
        hrefs
    }

    fn insert(&self, href: &str, canned: Canned) {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(href.to_string(), canned);
    }
}

#[async_trait]
impl JsonFetcher for StaticFetcher {
    async fn fetch_json(&self, href: &Url) -> Result<Value> {
        let key = href.as_str();
        *self
            .counts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_default() += 1;

        let canned = self
            .documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();

        // Suspend like a real fetch so sibling resolutions interleave.
        tokio::task::yield_now().await;

        match canned {
            Some(Canned::Json(document)) => Ok(document),
            Some(Canned::Status(status)) => Err(SourceError::Status {
                href: key.to_string(),
                status,
            }),
            Some(Canned::Malformed(body)) => {
                serde_json::from_str(&body).map_err(|source| SourceError::Decode {
                    href: key.to_string(),
                    source,
                })
            }
            None => Err(SourceError::Status {
                href: key.to_string(),
                status: 404,
            }),
        }
    }
}
