//! Configuration loading, env substitution, and environment overrides.
//!
//! Config files: `beacon.toml`, `beacon.yaml`, or `beacon.json`
//! Searched in `./` then `~/.config/beacon/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, load_config},
    schema::{
        BeaconConfig, CredentialsConfig, DatabaseConfig, GmailConfig, OAuthSettings, RelayConfig,
        ServerConfig, SlackConfig,
    },
};
