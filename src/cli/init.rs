//! Init command

use colored::Colorize;
use vpnbridge_core::config::toml_config::{config_exists, get_config_path, save_config_to_path};
use vpnbridge_core::config::BridgeConfig;

/// Write a default configuration file unless one exists
pub fn run_init(force: bool) -> anyhow::Result<()> {
    let path = get_config_path()?;
    if config_exists()? && !force {
        println!(
            "Configuration already exists at {} (use --force to overwrite)",
            path.display()
        );
        return Ok(());
    }

    save_config_to_path(&BridgeConfig::default(), &path)?;
    println!("{} {}", "Wrote default configuration to".green(), path.display());
    Ok(())
}
