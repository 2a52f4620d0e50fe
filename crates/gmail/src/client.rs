use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tracing::debug,
};

use beacon_config::GmailConfig;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    email_address: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    id: String,
}

/// Minimal Gmail REST client acting as `users/me`.
#[derive(Debug, Clone)]
pub struct GmailClient {
    base_url: String,
    http: reqwest::Client,
}

impl GmailClient {
    /// Client with the configured per-request timeout.
    pub fn new(config: &GmailConfig) -> Result<Self> {
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

    /// Address of the account the access token belongs to.
    pub async fn profile_email(&self, access_token: &Secret<String>) -> Result<String> {
        let resp = self
            .http
            .get(format!("{}/users/me/profile", self.base_url))
            .bearer_auth(access_token.expose_secret())
            .send()
            .await?;
        let resp = check(resp, "profile").await?;
        let profile: Profile = resp.json().await?;
        Ok(profile.email_address)
    }

    /// Submit an already-encoded message and return its Gmail ID.
    pub async fn send_raw(&self, access_token: &Secret<String>, raw: &str) -> Result<String> {
        let resp = self
            .http
            .post(format!("{}/users/me/messages/send", self.base_url))
            .bearer_auth(access_token.expose_secret())
            .json(&serde_json::json!({ "raw": raw }))
            .send()
            .await?;
        let resp = check(resp, "messages.send").await?;
        let sent: SendResponse = resp.json().await?;
        debug!(message_id = %sent.id, "gmail accepted message");
        Ok(sent.id)
    }
}

async fn check(resp: reqwest::Response, operation: &'static str) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Api {
        operation,
        status: status.as_u16(),
        body,
    })
}
