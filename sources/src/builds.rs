//! Build list adapter.
//!
//! Each environment publishes `ep.builds.config.json` next to its deployed
//! builds: a flat list of build names.

use std::sync::Arc;

use serde_json::Value;
use url::Url;

use crate::error::{Result, SourceError};
use crate::fetch::{JsonFetcher, resolve_location};
use crate::model::BuildRecord;

/// Build list document name, relative to an environment's base location.
pub const BUILDS_DOCUMENT: &str = "ep.builds.config.json";

/// Location of the build list for `environment_href`.
pub fn builds_location(environment_href: &str) -> Result<Url> {
    resolve_location(environment_href, BUILDS_DOCUMENT)
}

#[derive(Clone)]
pub struct BuildListSource {
    fetcher: Arc<dyn JsonFetcher>,
}

impl BuildListSource {
    pub fn new(fetcher: Arc<dyn JsonFetcher>) -> Self {
        Self { fetcher }
    }

    /// Builds deployed to one environment, in document order.
    ///
    /// Every record carries `environment_href` so metadata can be located
    /// from the build alone.
    pub async fn fetch_builds_for_environment(
        &self,
        environment_href: &str,
    ) -> Result<Vec<BuildRecord>> {
        let location = builds_location(environment_href)?;
        let document = self.fetcher.fetch_json(&location).await?;
        let names = build_names(location.as_str(), document)?;

        Ok(names
            .into_iter()
            .map(|name| BuildRecord {
                name,
                href: environment_href.to_string(),
            })
            .collect())
    }
}

fn build_names(href: &str, document: Value) -> Result<Vec<String>> {
    serde_json::from_value(document)
        .map_err(|e| SourceError::shape(href, format!("expected a list of build names: {e}")))
}
