//! Core library for vpnbridge
//!
//! Reconciles the state of a locally running VPN client with per-request
//! proxy decisions: the client link, the extension state machine, site
//! overrides, proxy resolution and tab consistency.

pub mod error;
pub mod types;

pub mod client;
pub mod config;
pub mod engine;
pub mod extension;
pub mod overrides;
pub mod proxy;
pub mod storage;
pub mod tabs;

/// Initialize logging infrastructure
///
/// Uses the systemd journal when running under systemd, stderr otherwise.
/// The level comes from `RUST_LOG`, defaulting to INFO.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    #[cfg(target_os = "linux")]
    {
        if std::env::var("JOURNAL_STREAM").is_ok() {
            let journal_layer = tracing_journald::layer()?;
            tracing_subscriber::registry()
                .with(journal_layer)
                .with(filter)
                .init();
            return Ok(());
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    Ok(())
}
