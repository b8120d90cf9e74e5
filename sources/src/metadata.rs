//! Build metadata adapter.
//!
//! A deployed build publishes `ep.metadata.config.json` at its own root.
//! Builds cut from trunk carry a `sourceName` (the branch) distinct from the
//! `buildName`; older builds only have `buildName`, which then doubles as the
//! source.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::error::{Result, SourceError};
use crate::fetch::{JsonFetcher, resolve_location};
use crate::model::MetadataRecord;

/// Metadata document name, relative to a build's root.
pub const METADATA_DOCUMENT: &str = "ep.metadata.config.json";

/// Location of the metadata for `build_name` under `environment_href`.
pub fn metadata_location(environment_href: &str, build_name: &str) -> Result<Url> {
    resolve_location(environment_href, &format!("{build_name}/{METADATA_DOCUMENT}"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetadataDocument {
    #[serde(default)]
    build_id: Option<BuildId>,
    #[serde(default)]
    build_name: Option<String>,
    #[serde(default)]
    source_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BuildId {
    Text(String),
    Number(serde_json::Number),
}

impl BuildId {
    fn into_string(self) -> String {
        match self {
            Self::Text(id) => id,
            Self::Number(id) => id.to_string(),
        }
    }
}

impl MetadataRecord {
    /// Normalize a metadata document. `href` only labels errors.
    pub fn from_document(href: &str, document: Value) -> Result<Self> {
        let doc: MetadataDocument = serde_json::from_value(document)
            .map_err(|e| SourceError::shape(href, format!("metadata is malformed: {e}")))?;

        let id = doc
            .build_id
            .ok_or_else(|| SourceError::shape(href, "metadata has no buildId"))?
            .into_string();
        let source = doc
            .source_name
            .or(doc.build_name)
            .ok_or_else(|| SourceError::shape(href, "metadata has neither sourceName nor buildName"))?;

        Ok(Self { id, source })
    }
}

#[derive(Clone)]
pub struct MetadataSource {
    fetcher: Arc<dyn JsonFetcher>,
}

impl MetadataSource {
    pub fn new(fetcher: Arc<dyn JsonFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn fetch_metadata_for_build(
        &self,
        environment_href: &str,
        build_name: &str,
    ) -> Result<MetadataRecord> {
        let location = metadata_location(environment_href, build_name)?;
        let document = self.fetcher.fetch_json(&location).await?;
        MetadataRecord::from_document(location.as_str(), document)
    }
}
