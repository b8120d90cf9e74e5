//! App registry adapter.
//!
//! The registry is one global document mapping arbitrary keys to ecosystem
//! entries. Only entries typed [`MFE_APP_TYPE`] are apps; vendors, proxy
//! targets and endpoint entries are skipped without being inspected further.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::{Result, SourceError};
use crate::fetch::JsonFetcher;
use crate::model::{AppRecord, Environments, MFE_APP_TYPE};

/// Published location of the registry document.
pub const DEFAULT_REGISTRY_URL: &str =
    "https://mfe-global-config.educationperfect.com/v0/ep.global.config.json";

/// Body of an app entry. The key lives outside the body.
#[derive(Debug, Deserialize)]
struct AppEntry {
    name: String,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    environments: Environments,
}

/// Apps from one registry fetch, in document order and indexed for lookup.
#[derive(Debug, Clone, Default)]
pub struct AppIndex {
    apps: Vec<AppRecord>,
    positions: HashMap<String, usize>,
}

impl AppIndex {
    /// Project a registry document into apps.
    ///
    /// `href` only labels errors.
    pub fn from_document(href: &str, document: Value) -> Result<Self> {
        let Value::Object(entries) = document else {
            return Err(SourceError::shape(href, "registry is not an object"));
        };

        let mut apps = Vec::new();
        for (key, entry) in entries {
            // Non-app entries have no common shape and may carry no type at all.
            match entry.get("type").and_then(Value::as_str) {
                Some(MFE_APP_TYPE) => {}
                other => {
                    tracing::debug!(key = %key, kind = ?other, "skipping non-app registry entry");
                    continue;
                }
            }

            let body: AppEntry = serde_json::from_value(entry).map_err(|e| {
                SourceError::shape(href, format!("app `{key}` is malformed: {e}"))
            })?;
            apps.push(AppRecord {
                kind: MFE_APP_TYPE.to_string(),
                key,
                name: body.name,
                dependencies: body.dependencies,
                environments: body.environments,
            });
        }

        Ok(Self::from_apps(apps))
    }

    pub fn from_apps(apps: Vec<AppRecord>) -> Self {
        let positions = apps
            .iter()
            .enumerate()
            .map(|(idx, app)| (app.key.clone(), idx))
            .collect();
        Self { apps, positions }
    }

    pub fn all(&self) -> &[AppRecord] {
        &self.apps
    }

    pub fn into_apps(self) -> Vec<AppRecord> {
        self.apps
    }

    pub fn len(&self) -> usize {
        self.apps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&AppRecord> {
        self.positions.get(key).map(|&idx| &self.apps[idx])
    }

    /// Apps for `keys` in first-occurrence order. Unknown keys are omitted and
    /// repeated keys yield one record.
    pub fn select<'a, I>(&self, keys: I) -> Vec<&AppRecord>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut seen = HashSet::new();
        keys.into_iter()
            .filter(|key| seen.insert(*key))
            .filter_map(|key| self.get(key))
            .collect()
    }
}

/// Reads apps out of the registry document.
///
/// Every operation performs its own fetch; callers that need a consistent
/// snapshot across lookups should hold on to an [`AppIndex`].
#[derive(Clone)]
pub struct RegistrySource {
    fetcher: Arc<dyn JsonFetcher>,
    location: Url,
}

impl RegistrySource {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, location: Url) -> Self {
        Self { fetcher, location }
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    /// Fetch the registry once and index its apps.
    pub async fn fetch_registry(&self) -> Result<AppIndex> {
        let document = self.fetcher.fetch_json(&self.location).await?;
        let index = AppIndex::from_document(self.location.as_str(), document)?;
        tracing::debug!(
            href = %self.location,
            apps = index.len(),
            "registry indexed"
        );
        Ok(index)
    }

    pub async fn fetch_all_apps(&self) -> Result<Vec<AppRecord>> {
        Ok(self.fetch_registry().await?.into_apps())
    }

    pub async fn fetch_app_by_key(&self, key: &str) -> Result<Option<AppRecord>> {
        Ok(self.fetch_registry().await?.get(key).cloned())
    }

    pub async fn fetch_apps_by_keys(&self, keys: &[String]) -> Result<Vec<AppRecord>> {
        let index = self.fetch_registry().await?;
        Ok(index
            .select(keys.iter().map(String::as_str))
            .into_iter()
            .cloned()
            .collect())
    }
}
