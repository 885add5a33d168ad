//! Configuration module
//!
//! Handles loading and saving bridge configuration from TOML files.

use crate::client::message::ClientVersion;
use crate::types::{parse_proxy, ProxyEndpoint, DEFAULT_SOCKS_PORT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod toml_config;

/// Complete bridge configuration
///
/// Every section is optional in the file; missing sections take their defaults.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Native bridge and VPN client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Proxy endpoints used by the resolver
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Persistent state location
    #[serde(default)]
    pub storage: StorageConfig,

    /// Native bridge restart policy
    #[serde(default)]
    pub restart: RestartPolicy,
}

impl BridgeConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        self.client.validate()?;
        self.proxy.validate()?;
        self.restart.validate()?;
        Ok(())
    }
}

/// Native bridge settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Path to the native messaging bridge executable
    #[serde(default = "default_bridge_path")]
    pub bridge_path: PathBuf,

    /// Extra arguments passed to the bridge
    #[serde(default)]
    pub bridge_args: Vec<String>,

    /// Oldest VPN client version this bridge talks to
    #[serde(default = "default_minimum_version")]
    pub minimum_version: String,

    /// Executable names of this browser, matched against the split-tunnel list
    #[serde(default = "default_browser_executables")]
    pub browser_executables: Vec<String>,
}

fn default_bridge_path() -> PathBuf {
    PathBuf::from("/usr/lib/mozillavpn/mozillavpnnp")
}

fn default_minimum_version() -> String {
    "2.20.0".to_string()
}

fn default_browser_executables() -> Vec<String> {
    vec!["firefox".to_string()]
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bridge_path: default_bridge_path(),
            bridge_args: Vec::new(),
            minimum_version: default_minimum_version(),
            browser_executables: default_browser_executables(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.bridge_path.as_os_str().is_empty() {
            return Err("Bridge path cannot be empty".to_string());
        }

        if ClientVersion::parse(&self.minimum_version).is_none() {
            return Err(format!(
                "Minimum version is not a dotted version number: {}",
                self.minimum_version
            ));
        }

        if self.browser_executables.iter().any(|exe| exe.trim().is_empty()) {
            return Err("Browser executable names cannot be empty".to_string());
        }

        Ok(())
    }
}

/// Proxy settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Local endpoint that bypasses the tunnel, used for excluded sites
    #[serde(default = "default_local_bypass")]
    pub local_bypass: String,

    /// Port of the SOCKS relay on every exit server
    #[serde(default = "default_relay_port")]
    pub relay_port: u16,
}

fn default_local_bypass() -> String {
    "socks://localhost:8123".to_string()
}

fn default_relay_port() -> u16 {
    DEFAULT_SOCKS_PORT
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            local_bypass: default_local_bypass(),
            relay_port: default_relay_port(),
        }
    }
}

impl ProxyConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.local_bypass_endpoint().is_none() {
            return Err(format!(
                "Local bypass is not a proxy URL: {}",
                self.local_bypass
            ));
        }

        if self.relay_port == 0 {
            return Err("Relay port cannot be zero".to_string());
        }

        Ok(())
    }

    /// Parsed local bypass endpoint
    pub fn local_bypass_endpoint(&self) -> Option<ProxyEndpoint> {
        parse_proxy(&self.local_bypass).endpoint()
    }
}

/// Persistent state settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON state file; defaults to `state.json` next to the config file
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// How the native bridge is restarted after it exits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// Base interval in seconds for exponential backoff
    #[serde(default = "default_base_interval")]
    pub base_interval_secs: u32,

    /// Multiplier for exponential backoff
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,

    /// Cap for the backoff interval
    #[serde(default = "default_max_interval")]
    pub max_interval_secs: u32,

    /// Give up after this many consecutive failed restarts; unlimited when unset
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

fn default_base_interval() -> u32 {
    1
}

fn default_backoff_multiplier() -> u32 {
    2
}

fn default_max_interval() -> u32 {
    60
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            base_interval_secs: default_base_interval(),
            backoff_multiplier: default_backoff_multiplier(),
            max_interval_secs: default_max_interval(),
            max_attempts: None,
        }
    }
}

impl RestartPolicy {
    pub fn validate(&self) -> Result<(), String> {
        if self.base_interval_secs < 1 || self.base_interval_secs > 300 {
            return Err(format!(
                "Base interval must be between 1 and 300 seconds, got {}",
                self.base_interval_secs
            ));
        }

        if self.backoff_multiplier < 1 || self.backoff_multiplier > 10 {
            return Err(format!(
                "Backoff multiplier must be between 1 and 10, got {}",
                self.backoff_multiplier
            ));
        }

        if self.max_interval_secs < self.base_interval_secs {
            return Err(format!(
                "Max interval ({}) must be >= base interval ({})",
                self.max_interval_secs, self.base_interval_secs
            ));
        }

        if self.max_attempts == Some(0) {
            return Err("Max attempts cannot be zero".to_string());
        }

        Ok(())
    }

    /// Delay before restart `attempt` (1-based): base * multiplier^(attempt-1), capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = (self.backoff_multiplier as u64).saturating_pow(exponent);
        let interval_secs = (self.base_interval_secs as u64).saturating_mul(factor);
        Duration::from_secs(interval_secs.min(self.max_interval_secs as u64))
    }
}
