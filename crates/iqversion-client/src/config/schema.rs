use std::time::Duration;

use serde::Deserialize;

use iqversion_core::error::{Result, VersionError};
use iqversion_core::protocol::SoftwareVersion;

use crate::version::flood::DEFAULT_MIN_INTERVAL_MS;
use crate::version::manager::{VersionSettings, DEFAULT_REQUEST_TIMEOUT_MS};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub version: u32,

    #[serde(default)]
    pub flood: FloodSection,

    /// Identity to answer with; queries are ignored while unset.
    #[serde(default)]
    pub identity: Option<IdentitySection>,

    #[serde(default)]
    pub requests: RequestSection,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(VersionError::Config(format!(
                "unsupported config version: {}",
                self.version
            )));
        }
        self.flood.validate()?;
        if let Some(identity) = &self.identity {
            identity.validate()?;
        }
        self.requests.validate()?;
        Ok(())
    }

    pub fn settings(&self) -> VersionSettings {
        VersionSettings {
            min_interval: Duration::from_millis(self.flood.min_interval_ms),
            identity: self.identity.as_ref().map(IdentitySection::to_payload),
            request_timeout: Duration::from_millis(self.requests.timeout_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FloodSection {
    /// 0 disables flood protection.
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for FloodSection {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl FloodSection {
    pub fn validate(&self) -> Result<()> {
        if self.min_interval_ms > 60_000 {
            return Err(VersionError::Config(
                "flood.min_interval_ms must be at most 60000".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentitySection {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub os: Option<String>,
}

impl IdentitySection {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(VersionError::Config("identity.name must not be empty".into()));
        }
        if self.version.trim().is_empty() {
            return Err(VersionError::Config("identity.version must not be empty".into()));
        }
        Ok(())
    }

    pub fn to_payload(&self) -> SoftwareVersion {
        SoftwareVersion {
            name: Some(self.name.clone()),
            version: Some(self.version.clone()),
            os: self.os.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestSection {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for RequestSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl RequestSection {
    pub fn validate(&self) -> Result<()> {
        if !(1..=120_000).contains(&self.timeout_ms) {
            return Err(VersionError::Config(
                "requests.timeout_ms must be between 1 and 120000".into(),
            ));
        }
        Ok(())
    }
}

fn default_min_interval_ms() -> u64 {
    DEFAULT_MIN_INTERVAL_MS
}
fn default_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}
