use anyhow::{Context, Result};
use gatewayd_config::{parse_config, validate_config};
use std::path::Path;

pub fn execute(config_path: &str) -> Result<()> {
    let config =
        parse_config(Path::new(config_path)).context("failed to parse gateway config")?;
    validate_config(&config).context("gateway config failed validation")?;

    println!("{config_path}: valid");
    println!("  gateway: {} ({}:{})", config.gateway.name, config.gateway.host, config.gateway.port);
    println!("  backends: {}", config.backends.len());
    println!("  oauth clients: {}", config.auth.oauth_clients.len());
    Ok(())
}
