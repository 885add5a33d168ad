//! Error types for vpnbridge
//!
//! This module defines all error types used throughout the workspace,
//! grouped by the boundary they come from: configuration, the native
//! bridge transport, the client protocol, persistent storage, the site
//! override store and the browser tab API.

use thiserror::Error;

/// Main error type for vpnbridge
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Errors related to configuration loading/parsing
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors related to the native bridge transport
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Errors related to messages received from the VPN client
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Errors related to persistent storage
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Errors related to per-origin overrides
    #[error("Site override error: {0}")]
    Override(#[from] OverrideError),

    /// Errors related to browser tab commands
    #[error("Tab error: {0}")]
    Tab(#[from] TabError),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration file: {path}")]
    LoadFailed { path: String },

    #[error("Failed to save configuration file: {path}")]
    SaveFailed { path: String },

    #[error("Configuration validation error: {message}")]
    ValidationError { message: String },

    #[error("I/O error: {message}")]
    IoError { message: String },
}

/// Native bridge transport errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Native bridge is not installed at {path}")]
    NotInstalled { path: String },

    #[error("Failed to spawn native bridge: {reason}")]
    SpawnFailed { reason: String },

    #[error("Native bridge channel is closed")]
    ChannelClosed,

    #[error("Failed to encode outbound frame: {reason}")]
    Encode { reason: String },

    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },
}

/// Errors in messages received from the VPN client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Frame carries neither a message type nor a bridge status")]
    MissingDiscriminant,

    #[error("Unknown message type: {kind}")]
    UnknownMessage { kind: String },

    #[error("Malformed {kind} payload: {reason}")]
    MalformedPayload { kind: String, reason: String },
}

/// Persistent key-value storage errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to read storage: {reason}")]
    Read { reason: String },

    #[error("Failed to write storage: {reason}")]
    Write { reason: String },

    #[error("Failed to (de)serialize stored value for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Storage rejected write to {key}")]
    Rejected { key: String },
}

/// Site override store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OverrideError {
    #[error("Location {country_code}/{city_code} is not in the server list")]
    UnknownLocation {
        country_code: String,
        city_code: String,
    },

    #[error("Location {country_code}/{city_code} has no relay servers")]
    NoRelays {
        country_code: String,
        city_code: String,
    },

    #[error("Invalid origin: {origin}")]
    InvalidOrigin { origin: String },

    #[error("Failed to persist overrides: {0}")]
    Storage(#[from] StorageError),
}

/// Browser tab API errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TabError {
    #[error("Tab query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Command on tab {tab_id} failed: {reason}")]
    CommandFailed { tab_id: u64, reason: String },
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, BridgeError>;
