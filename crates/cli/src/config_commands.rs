use anyhow::Result;

use beacon_config::BeaconConfig;

/// Render the effective configuration as TOML.
pub fn render(config: &BeaconConfig) -> Result<String> {
    Ok(toml::to_string_pretty(config)?)
}

pub fn print(config: &BeaconConfig) -> Result<()> {
    if let Some(dir) = beacon_config::config_dir() {
        eprintln!("# user config directory: {}", dir.display());
    }
    println!("{}", render(config)?);
    Ok(())
}
