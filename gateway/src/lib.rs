//! HTTP and command-line surface of the MFE gateway.
//!
//! [`config`] loads [`GatewayConfig`]; [`build_engine`] wires the production
//! fetcher and adapters into an [`Engine`]; [`server`] exposes that engine
//! over HTTP.

pub mod config;
pub mod server;

use std::sync::Arc;

use mfe_engine::{Engine, Sources};
use mfe_sources::{HttpJsonFetcher, SourceError};
use thiserror::Error;

pub use config::{ConfigError, GatewayConfig};
pub use server::{GatewayServer, ServeError, ShutdownHandle};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to set up upstream fetcher")]
    Fetcher(#[from] SourceError),

    #[error(transparent)]
    Serve(#[from] ServeError),
}

/// Engine backed by the HTTP fetcher described by `config`.
pub fn build_engine(config: &GatewayConfig) -> Result<Engine, GatewayError> {
    let location = config.registry_location()?;
    let fetcher = HttpJsonFetcher::new(&config.fetcher_config())?;
    tracing::debug!(
        registry = %location,
        max_concurrent_fetches = config.upstream.max_concurrent_fetches,
        "engine configured"
    );
    Ok(Engine::new(
        Sources::new(Arc::new(fetcher), location),
        config.engine_options(),
    ))
}
