//! Device agent configuration, loadable from TOML.

use std::path::Path;

use iotf_client::{ClientSettings, Config, IdentityParams, Role};
use serde::Deserialize;

/// Top-level configuration for the device agent.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Whether the agent connects as a device or a gateway.
    #[serde(default)]
    pub role: Role,
    /// Platform identity and credentials.
    pub identity: IdentityParams,
    /// Client tunables (keep-alive, timeouts, reconnect backoff).
    #[serde(default)]
    pub client: ClientSettings,
    /// Status event interval in seconds.
    #[serde(default = "default_status_interval")]
    pub status_interval_secs: u64,
    /// Format segment of the status event topic.
    #[serde(default = "default_status_format")]
    pub status_format: String,
    /// Default tracing filter; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Devices behind this gateway whose commands are forwarded.
    #[serde(default)]
    pub attached_devices: Vec<AttachedDevice>,
}

/// A device reachable through the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AttachedDevice {
    #[serde(rename = "type")]
    pub device_type: String,
    #[serde(rename = "id")]
    pub device_id: String,
}

fn default_status_interval() -> u64 {
    30
}

fn default_status_format() -> String {
    "json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AgentConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Validate the identity section for the configured role.
    pub fn resolve_identity(&self) -> anyhow::Result<Config> {
        Ok(Config::resolve(self.identity.clone(), self.role)?)
    }
}
