//! Typed records produced by the adapters.

use serde::{Deserialize, Serialize};

/// Registry `type` value that marks an entry as a micro front-end app.
///
/// The registry also carries vendor, proxy and endpoint entries; those never
/// surface as apps.
pub const MFE_APP_TYPE: &str = "MFE_APP";

/// One deployable front-end application from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppRecord {
    /// Registry object key. Not part of the entry body.
    pub key: String,
    /// Registry discriminator (always [`MFE_APP_TYPE`] for records handed out).
    pub kind: String,
    pub name: String,
    /// Keys of other registry apps, as authored. May contain the app's own
    /// key, repeats, or keys that do not resolve.
    pub dependencies: Vec<String>,
    pub environments: Environments,
}

/// Deployment target names an app may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentName {
    Live,
    Staging,
    Test,
    Local,
}

impl EnvironmentName {
    pub const ALL: [EnvironmentName; 4] = [Self::Live, Self::Staging, Self::Test, Self::Local];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Staging => "staging",
            Self::Test => "test",
            Self::Local => "local",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|env| env.as_str() == name)
    }
}

/// Base location of one environment's deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRef {
    pub href: String,
}

/// Per-environment references of an app. Any of them may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environments {
    #[serde(default)]
    pub live: Option<EnvironmentRef>,
    #[serde(default)]
    pub staging: Option<EnvironmentRef>,
    #[serde(default)]
    pub test: Option<EnvironmentRef>,
    #[serde(default)]
    pub local: Option<EnvironmentRef>,
}

impl Environments {
    pub fn get(&self, name: EnvironmentName) -> Option<&EnvironmentRef> {
        match name {
            EnvironmentName::Live => self.live.as_ref(),
            EnvironmentName::Staging => self.staging.as_ref(),
            EnvironmentName::Test => self.test.as_ref(),
            EnvironmentName::Local => self.local.as_ref(),
        }
    }
}

/// One named build listed for an environment.
///
/// `href` is the owning environment's base location. It is carried so the
/// metadata tier can be reached from the build alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BuildRecord {
    pub name: String,
    pub href: String,
}

/// Normalized identity of a single build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub id: String,
    /// Source branch name, or the build name when the document has none.
    pub source: String,
}
