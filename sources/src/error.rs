//! Error type shared by the upstream adapters.
//!
//! Every variant carries the location that was being read so a failure can be
//! logged without extra context from the caller.

use thiserror::Error;

/// Failure reading or interpreting an upstream document.
#[derive(Debug, Error)]
pub enum SourceError {
    /// A document location could not be derived from its base.
    #[error("cannot resolve `{relative}` against `{base}`")]
    InvalidLocation {
        base: String,
        relative: String,
        #[source]
        source: url::ParseError,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client")]
    ClientInit {
        #[source]
        source: reqwest::Error,
    },

    /// The request never produced a response (connect, timeout, body read).
    #[error("request to {href} failed")]
    Transport {
        href: String,
        #[source]
        source: reqwest::Error,
    },

    /// The upstream answered with a non-success status.
    #[error("{href} responded with status {status}")]
    Status { href: String, status: u16 },

    /// The body was not JSON.
    #[error("{href} did not return valid JSON")]
    Decode {
        href: String,
        #[source]
        source: serde_json::Error,
    },

    /// The body was JSON but not the expected document shape.
    #[error("unexpected document shape at {href}: {message}")]
    Shape { href: String, message: String },

    /// The fetcher stopped accepting work.
    #[error("fetcher closed before {href} could be requested")]
    Closed { href: String },
}

impl SourceError {
    pub fn shape(href: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Shape {
            href: href.into(),
            message: message.into(),
        }
    }

    /// Location the failing operation was reading, when one was known.
    pub fn href(&self) -> Option<&str> {
        match self {
            Self::InvalidLocation { base, .. } => Some(base),
            Self::ClientInit { .. } => None,
            Self::Transport { href, .. }
            | Self::Status { href, .. }
            | Self::Decode { href, .. }
            | Self::Shape { href, .. }
            | Self::Closed { href } => Some(href),
        }
    }
}

/// Result alias for adapter operations.
pub type Result<T> = std::result::Result<T, SourceError>;
