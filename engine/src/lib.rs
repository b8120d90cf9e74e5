//! Resolution engine for the MFE gateway.
//!
//! A query document is parsed and validated into a [`QuerySelection`] before
//! anything is fetched. Resolution then walks that selection against one
//! registry snapshot, fetching build lists and build metadata only where a
//! selected field needs them.
//!
//! ```text
//! Query        { mfes: [Mfe], mfe(key: String!): Mfe }
//! Mfe          { key, type, name, dependencies: [Mfe], environments: Environments }
//! Environments { live, staging, test, local: Environment }
//! Environment  { href, builds: [Build] }
//! Build        { name, href, metadata: Metadata }
//! Metadata     { id, source }
//! ```

mod cache;
pub mod error;
pub mod query;
mod resolver;
pub mod selection;

use std::sync::Arc;
use std::time::Instant;

use mfe_sources::{BuildListSource, JsonFetcher, MetadataSource, RegistrySource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

pub use error::{ErrorCategory, QueryError, ResolveError};
pub use query::Document;
pub use selection::QuerySelection;

use resolver::RequestScope;

/// Engine behaviour switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Make `Build.href` selectable.
    pub expose_build_href: bool,
}

/// The three upstream adapters, sharing one fetcher.
pub struct Sources {
    pub registry: RegistrySource,
    pub builds: BuildListSource,
    pub metadata: MetadataSource,
}

impl Sources {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, registry_location: Url) -> Self {
        Self {
            registry: RegistrySource::new(Arc::clone(&fetcher), registry_location),
            builds: BuildListSource::new(Arc::clone(&fetcher)),
            metadata: MetadataSource::new(fetcher),
        }
    }
}

/// Incoming query, in the usual GraphQL-over-HTTP body shape.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub variables: Map<String, Value>,
    #[serde(rename = "operationName", default)]
    pub operation_name: Option<String>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One entry of a response's `errors` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    pub message: String,
    pub extensions: ErrorExtensions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorExtensions {
    pub code: String,
}

/// Response envelope: `data` always present, `errors` only when non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub data: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ResponseError>,
}

impl QueryResponse {
    pub fn from_result(result: Result<Value, ResolveError>) -> Self {
        match result {
            Ok(data) => Self {
                data,
                errors: Vec::new(),
            },
            Err(err) => Self::from_error(&err),
        }
    }

    pub fn from_error(err: &ResolveError) -> Self {
        Self {
            data: Value::Null,
            errors: vec![ResponseError {
                message: err.to_string(),
                extensions: ErrorExtensions {
                    code: err.category().as_str().to_string(),
                },
            }],
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Entry point: validates query documents and resolves them.
///
/// Cheap to clone; every clone shares the same adapters. Each call to
/// [`Engine::execute`] gets its own registry snapshot and fetch caches.
#[derive(Clone)]
pub struct Engine {
    sources: Arc<Sources>,
    options: EngineOptions,
}

impl Engine {
    pub fn new(sources: Sources, options: EngineOptions) -> Self {
        Self {
            sources: Arc::new(sources),
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn sources(&self) -> &Sources {
        &self.sources
    }

    /// Parse and validate without fetching anything.
    pub fn prepare(
        &self,
        query: &str,
        variables: &Map<String, Value>,
        operation_name: Option<&str>,
    ) -> Result<QuerySelection, QueryError> {
        let document = Document::parse(query)?;
        let operation = document.operation(operation_name)?;
        QuerySelection::from_operation(operation, variables, &self.options)
    }

    pub async fn execute(&self, request: &QueryRequest) -> Result<Value, ResolveError> {
        let selection = self
            .prepare(
                &request.query,
                &request.variables,
                request.operation_name.as_deref(),
            )
            .inspect_err(|err| {
                tracing::debug!(
                    category = ErrorCategory::QueryFailure.as_str(),
                    error = %err,
                    "query rejected"
                );
            })?;
        self.resolve(&selection).await
    }

    /// Resolve an already validated selection.
    pub async fn resolve(&self, selection: &QuerySelection) -> Result<Value, ResolveError> {
        let started = Instant::now();
        let apps = self
            .sources
            .registry
            .fetch_registry()
            .await
            .map_err(|err| {
                tracing::error!(
                    category = ErrorCategory::EntryResolutionFailure.as_str(),
                    registry = %self.sources.registry.location(),
                    error = %err,
                    "registry unavailable"
                );
                ResolveError::EntryResolution(err)
            })?;
        let app_count = apps.len();

        let scope = RequestScope::new(&self.sources, apps);
        let data = scope.resolve(selection).await;

        tracing::info!(
            apps = app_count,
            roots = selection.roots.len(),
            build_lists = scope.build_lists_requested(),
            metadata = scope.metadata_requested(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "query resolved"
        );
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfe_sources::SourceError;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn request_accepts_missing_and_null_variables() {
        let request: QueryRequest = serde_json::from_value(json!({
            "query": "{ mfes { key } }",
            "variables": null
        }))
        .expect("request");
        assert!(request.variables.is_empty());
        assert_eq!(request.operation_name, None);

        let request: QueryRequest = serde_json::from_value(json!({
            "query": "query One { mfes { key } }",
            "operationName": "One"
        }))
        .expect("request");
        assert_eq!(request.operation_name.as_deref(), Some("One"));
    }

    #[test]
    fn successful_response_omits_errors() {
        let response = QueryResponse::from_result(Ok(json!({ "mfes": [] })));
        assert_eq!(
            serde_json::to_value(&response).expect("serialize"),
            json!({ "data": { "mfes": [] } })
        );
    }

    #[test]
    fn failed_response_carries_category_code() {
        let err = ResolveError::EntryResolution(SourceError::Status {
            href: "https://registry.example.com/ep.global.config.json".into(),
            status: 503,
        });
        let response = QueryResponse::from_result(Err(err));

        assert!(response.has_errors());
        assert_eq!(response.data, Value::Null);
        assert_eq!(response.errors[0].extensions.code, "ENTRY_RESOLUTION_FAILURE");
    }
}
