//! Typed Slack Web API calls used by the relay.

use std::time::Duration;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, de::DeserializeOwned},
    tracing::debug,
};

use beacon_config::SlackConfig;

use crate::error::{Error, Result};

/// Directory lookups the recipient resolver needs.
#[async_trait]
pub trait SlackDirectory: Send + Sync {
    /// Member IDs of `channel_id`, in the order Slack returns them.
    async fn channel_members(&self, token: &Secret<String>, channel_id: &str)
    -> Result<Vec<String>>;

    /// Email on `user_id`'s profile, `None` when the profile has none.
    async fn user_email(&self, token: &Secret<String>, user_id: &str) -> Result<Option<String>>;
}

#[derive(Debug, Deserialize)]
struct MembersResponse {
    ok: bool,
    #[serde(default)]
    members: Option<Vec<String>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    ok: bool,
    #[serde(default)]
    user: Option<SlackUser>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackUser {
    profile: UserProfile,
}

#[derive(Debug, Deserialize)]
struct UserProfile {
    #[serde(default)]
    email: Option<String>,
}

/// HTTP client for `slack.com/api`.
#[derive(Debug, Clone)]
pub struct SlackClient {
    base_url: String,
    http: reqwest::Client,
}

impl SlackClient {
    /// Client with the configured per-request timeout.
    pub fn new(config: &SlackConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::with_client(&config.api_base, http))
    }

    pub fn with_client(base_url: &str, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        method: &'static str,
        token: &Secret<String>,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let url = format!("{}/{method}", self.base_url);
        debug!(method, "calling slack api");
        let resp = self
            .http
            .get(url)
            .bearer_auth(token.expose_secret())
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                method,
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| Error::decode(method, e))
    }
}

#[async_trait]
impl SlackDirectory for SlackClient {
    async fn channel_members(
        &self,
        token: &Secret<String>,
        channel_id: &str,
    ) -> Result<Vec<String>> {
        const METHOD: &str = "conversations.members";
        let resp: MembersResponse = self.get(METHOD, token, &[("channel", channel_id)]).await?;
        if !resp.ok {
            return Err(Error::Api {
                method: METHOD,
                error: resp.error.unwrap_or_else(|| "unknown_error".into()),
            });
        }
        resp.members
            .ok_or_else(|| Error::decode(METHOD, "members array missing"))
    }

    async fn user_email(&self, token: &Secret<String>, user_id: &str) -> Result<Option<String>> {
        const METHOD: &str = "users.info";
        let resp: UserInfoResponse = self.get(METHOD, token, &[("user", user_id)]).await?;
        if !resp.ok {
            return Err(Error::Api {
                method: METHOD,
                error: resp.error.unwrap_or_else(|| "unknown_error".into()),
            });
        }
        let user = resp
            .user
            .ok_or_else(|| Error::decode(METHOD, "user object missing"))?;
        Ok(user.profile.email.filter(|e| !e.is_empty()))
    }
}
