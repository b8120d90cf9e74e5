//! Upstream document adapters for the MFE gateway.
//!
//! Three leaf adapters, one per document type, none depending on another:
//!
//! - [`RegistrySource`]: the global registry, filtered to app entries.
//! - [`BuildListSource`]: an environment's `ep.builds.config.json`.
//! - [`MetadataSource`]: a build's `ep.metadata.config.json`.
//!
//! All of them read through the [`JsonFetcher`] seam. [`HttpJsonFetcher`] is
//! the production implementation.

pub mod builds;
pub mod error;
pub mod fetch;
pub mod metadata;
pub mod model;
pub mod registry;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use builds::{BUILDS_DOCUMENT, BuildListSource, builds_location};
pub use error::{Result, SourceError};
pub use fetch::{FetcherConfig, HttpJsonFetcher, JsonFetcher, resolve_location};
pub use metadata::{METADATA_DOCUMENT, MetadataSource, metadata_location};
pub use model::{
    AppRecord, BuildRecord, EnvironmentName, EnvironmentRef, Environments, MFE_APP_TYPE,
    MetadataRecord,
};
pub use registry::{AppIndex, DEFAULT_REGISTRY_URL, RegistrySource};
