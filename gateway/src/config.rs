//! Gateway configuration loading
//!
//! Loads configuration from `~/.config/mfe-gateway/gateway.toml` (or
//! `MFE_GATEWAY_CONFIG` env). Every field has a default, so an absent file
//! and an empty file both yield a working configuration.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mfe_engine::EngineOptions;
use mfe_sources::{DEFAULT_REGISTRY_URL, FetcherConfig};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Configuration could not be read, parsed or accepted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse {
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Root configuration for the gateway
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Location of the global registry document
    #[serde(default = "default_registry_url")]
    pub registry_url: String,

    /// Address the HTTP transport binds to
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Budget for one whole query, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Upstream fetch settings
    #[serde(default)]
    pub upstream: UpstreamConfig,

    /// Query graph switches
    #[serde(default)]
    pub schema: SchemaConfig,
}

fn default_registry_url() -> String {
    DEFAULT_REGISTRY_URL.to_string()
}
fn default_listen_addr() -> String {
    "127.0.0.1:4000".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}

/// Upstream fetch configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UpstreamConfig {
    /// Per-document timeout, in seconds
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Process-wide cap on in-flight upstream requests
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_fetch_timeout_secs() -> u64 {
    10
}
fn default_max_concurrent_fetches() -> usize {
    mfe_sources::fetch::DEFAULT_MAX_CONCURRENT_FETCHES
}
fn default_user_agent() -> String {
    format!("mfe-gateway/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            user_agent: default_user_agent(),
        }
    }
}

/// Query graph configuration
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Make `Build.href` selectable
    #[serde(default)]
    pub expose_build_href: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            registry_url: default_registry_url(),
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout_secs(),
            upstream: UpstreamConfig::default(),
            schema: SchemaConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Environment variable for config path override
    pub const ENV_CONFIG_PATH: &'static str = "MFE_GATEWAY_CONFIG";

    /// Default config filename
    pub const DEFAULT_CONFIG_FILENAME: &'static str = "gateway.toml";

    /// Load configuration from file
    ///
    /// Resolution order:
    /// 1. `explicit`, when given (must exist)
    /// 2. `MFE_GATEWAY_CONFIG` environment variable
    /// 3. `~/.config/mfe-gateway/gateway.toml`
    ///
    /// If no explicit path was given and the resolved file doesn't exist,
    /// returns default configuration.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }

        let path = Self::resolve_config_path(std::env::var_os(Self::ENV_CONFIG_PATH));
        if !path.exists() {
            tracing::info!(
                path = %path.display(),
                "gateway config not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load_from_path(&path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let cfg = Self::parse(&contents)?;
        tracing::debug!(path = %path.display(), "gateway config loaded");
        Ok(cfg)
    }

    /// Parse configuration from TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let cfg: GatewayConfig =
            toml::from_str(contents).map_err(|source| ConfigError::Parse { source })?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve_config_path(env_override: Option<std::ffi::OsString>) -> PathBuf {
        if let Some(path) = env_override {
            return PathBuf::from(path);
        }

        dirs::home_dir()
            .map(|h| {
                h.join(".config")
                    .join("mfe-gateway")
                    .join(Self::DEFAULT_CONFIG_FILENAME)
            })
            .unwrap_or_else(|| PathBuf::from(Self::DEFAULT_CONFIG_FILENAME))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.registry_location()?;
        self.listen_socket_addr()?;

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.upstream.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "upstream.fetch_timeout_secs must be greater than zero".into(),
            ));
        }
        if self.upstream.max_concurrent_fetches == 0 {
            return Err(ConfigError::Invalid(
                "upstream.max_concurrent_fetches must be greater than zero".into(),
            ));
        }
        if self.upstream.fetch_timeout_secs > self.request_timeout_secs {
            tracing::warn!(
                fetch_timeout_secs = self.upstream.fetch_timeout_secs,
                request_timeout_secs = self.request_timeout_secs,
                "upstream fetch timeout exceeds the request timeout"
            );
        }

        Ok(())
    }

    pub fn registry_location(&self) -> Result<Url> {
        let url = Url::parse(&self.registry_url).map_err(|e| {
            ConfigError::Invalid(format!("registry_url `{}` is not a URL: {e}", self.registry_url))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ConfigError::Invalid(format!(
                "registry_url must be http or https, got `{scheme}`"
            ))),
        }
    }

    pub fn listen_socket_addr(&self) -> Result<SocketAddr> {
        self.listen_addr.parse().map_err(|e| {
            ConfigError::Invalid(format!("listen_addr `{}` is not a socket address: {e}", self.listen_addr))
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            timeout: Duration::from_secs(self.upstream.fetch_timeout_secs),
            max_concurrent_fetches: self.upstream.max_concurrent_fetches,
            user_agent: self.upstream.user_agent.clone(),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            expose_build_href: self.schema.expose_build_href,
        }
    }
}
