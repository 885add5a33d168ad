//! TOML configuration file I/O
//!
//! Handles loading and saving bridge configuration to/from TOML files
//! in the user's configuration directory.

use crate::config::BridgeConfig;
use crate::error::{BridgeError, ConfigError};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Default configuration file name
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default state file name, next to the configuration file
const STATE_FILE_NAME: &str = "state.json";

/// Get the configuration directory
///
/// Returns `VPNBRIDGE_CONFIG_DIR` if set, else `~/.config/vpnbridge`
pub fn get_config_dir() -> Result<PathBuf, BridgeError> {
    if let Ok(config_dir) = std::env::var("VPNBRIDGE_CONFIG_DIR") {
        return Ok(PathBuf::from(config_dir));
    }

    let home = std::env::var("HOME").map_err(|_| {
        BridgeError::Config(ConfigError::IoError {
            message: "HOME environment variable not set".to_string(),
        })
    })?;

    Ok(PathBuf::from(home).join(".config").join("vpnbridge"))
}

/// Get the default configuration file path
pub fn get_config_path() -> Result<PathBuf, BridgeError> {
    Ok(get_config_dir()?.join(CONFIG_FILE_NAME))
}

/// Where persistent state lives for this configuration
pub fn state_path(config: &BridgeConfig) -> Result<PathBuf, BridgeError> {
    match &config.storage.path {
        Some(path) => Ok(path.clone()),
        None => Ok(get_config_dir()?.join(STATE_FILE_NAME)),
    }
}

/// Load configuration from the default TOML file
///
/// A missing file yields the defaults.
pub fn load_config() -> Result<BridgeConfig, BridgeError> {
    let config_path = get_config_path()?;
    if !config_path.exists() {
        debug!("No config file at {:?}, using defaults", config_path);
        return Ok(BridgeConfig::default());
    }
    load_config_from_path(&config_path)
}

/// Load configuration from a specific TOML file
pub fn load_config_from_path<P: AsRef<Path>>(path: P) -> Result<BridgeConfig, BridgeError> {
    let contents = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => BridgeError::Config(ConfigError::LoadFailed {
            path: path.as_ref().to_string_lossy().to_string(),
        }),
        _ => BridgeError::Config(ConfigError::IoError {
            message: format!("Failed to read config file: {}", e),
        }),
    })?;

    let config: BridgeConfig = toml::from_str(&contents).map_err(|e| {
        BridgeError::Config(ConfigError::ValidationError {
            message: format!("Failed to parse config file: {}", e),
        })
    })?;

    config
        .validate()
        .map_err(|message| BridgeError::Config(ConfigError::ValidationError { message }))?;

    debug!(
        bridge = %config.client.bridge_path.display(),
        minimum_version = %config.client.minimum_version,
        relay_port = config.proxy.relay_port,
        "Loaded configuration"
    );

    Ok(config)
}

/// Save configuration to a specific TOML file
pub fn save_config_to_path<P: AsRef<Path>>(
    config: &BridgeConfig,
    path: P,
) -> Result<(), BridgeError> {
    config
        .validate()
        .map_err(|message| BridgeError::Config(ConfigError::ValidationError { message }))?;

    if let Some(parent) = path.as_ref().parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            BridgeError::Config(ConfigError::IoError {
                message: format!("Failed to create config directory: {}", e),
            })
        })?;
    }

    let contents = toml::to_string_pretty(config)?;

    std::fs::write(&path, contents).map_err(|_| {
        BridgeError::Config(ConfigError::SaveFailed {
            path: path.as_ref().to_string_lossy().to_string(),
        })
    })?;

    info!("Saved configuration to {:?}", path.as_ref());
    Ok(())
}

/// Check if a configuration file exists
pub fn config_exists() -> Result<bool, BridgeError> {
    Ok(get_config_path()?.exists())
}
