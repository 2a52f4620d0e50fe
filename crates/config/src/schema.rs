//! Config schema types (server, oauth, storage, platform APIs, relay tuning).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    pub server: ServerConfig,
    pub oauth: OAuthSettings,
    pub credentials: CredentialsConfig,
    pub database: DatabaseConfig,
    pub slack: SlackConfig,
    pub gmail: GmailConfig,
    pub relay: RelayConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// Seconds in-flight requests get to finish after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            shutdown_grace_secs: 15,
        }
    }
}

/// Mail-provider OAuth settings shared by every owning user.
///
/// Client IDs and secrets are per user and live in the credential store,
/// not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    /// Callback URL registered with the provider (`/oauth/callback`).
    pub redirect_url: String,
    /// Where the browser is sent after a successful callback.
    pub success_url: String,
    pub auth_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub exchange_timeout_secs: u64,
    pub state_ttl_secs: u64,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            redirect_url: "http://localhost:8080/oauth/callback".into(),
            success_url: "http://localhost:8080/success".into(),
            auth_url: "https://accounts.google.com/o/oauth2/auth".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            scopes: vec!["https://www.googleapis.com/auth/gmail.send".into()],
            exchange_timeout_secs: 10,
            state_ttl_secs: 15 * 60,
        }
    }
}

impl OAuthSettings {
    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout_secs)
    }

    pub fn state_ttl(&self) -> Duration {
        Duration::from_secs(self.state_ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// JSON snapshot of every user's credentials.
    pub file_path: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            file_path: "user_credentials.json".into(),
        }
    }
}

/// Team-mapping database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub connect_attempts: u32,
    pub connect_retry_secs: u64,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://beacon.db?mode=rwc".into(),
            connect_attempts: 3,
            connect_retry_secs: 2,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    pub api_base: String,
    pub request_timeout_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            api_base: "https://slack.com/api".into(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailConfig {
    pub api_base: String,
    pub request_timeout_secs: u64,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base: "https://gmail.googleapis.com/gmail/v1".into(),
            request_timeout_secs: 30,
        }
    }
}

/// Fan-out limits, deadlines, and retry budget for relaying one event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Channel members beyond this many are ignored.
    pub member_cap: usize,
    /// Concurrent `users.info` lookups.
    pub max_in_flight: usize,
    pub member_timeout_secs: u64,
    /// Ceiling for resolving one event, measured from webhook receipt.
    pub event_deadline_secs: u64,
    pub retry_attempts: u32,
    pub retry_initial_backoff_ms: u64,
    pub subject: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            member_cap: 50,
            max_in_flight: 5,
            member_timeout_secs: 3,
            event_deadline_secs: 25,
            retry_attempts: 3,
            retry_initial_backoff_ms: 1000,
            subject: "New Slack Message in Channel".into(),
        }
    }
}

impl RelayConfig {
    pub fn member_timeout(&self) -> Duration {
        Duration::from_secs(self.member_timeout_secs)
    }

    pub fn event_deadline(&self) -> Duration {
        Duration::from_secs(self.event_deadline_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_initial_backoff_ms)
    }
}
