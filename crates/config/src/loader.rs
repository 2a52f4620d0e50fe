use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::BeaconConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["beacon.toml", "beacon.yaml", "beacon.yml", "beacon.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<BeaconConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations, then apply
/// environment overrides.
///
/// Search order:
/// 1. `./beacon.{toml,yaml,yml,json}`
/// 2. `~/.config/beacon/beacon.{toml,yaml,yml,json}`
///
/// Falls back to `BeaconConfig::default()` when nothing is found or the file
/// fails to parse.
pub fn discover_and_load() -> BeaconConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                BeaconConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            BeaconConfig::default()
        },
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config
}

/// Apply the deployment environment variables on top of file config.
///
/// Unparseable numeric values are ignored with a warning.
pub fn apply_env_overrides(config: &mut BeaconConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(bind) = lookup("BEACON_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = lookup("PORT") {
        match port.parse() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid PORT"),
        }
    }
    if let Some(url) = lookup("DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(url) = lookup("OAUTH_REDIRECT_URL") {
        config.oauth.redirect_url = url;
    }
    if let Some(url) = lookup("OAUTH_SUCCESS_URL") {
        config.oauth.success_url = url;
    }
    if let Some(path) = lookup("CREDENTIALS_FILE_PATH") {
        config.credentials.file_path = path;
    }
}

fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/beacon/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "beacon").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<BeaconConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
