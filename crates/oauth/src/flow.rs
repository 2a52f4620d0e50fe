use std::time::Duration;

use {
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, warn},
    url::Url,
};

use beacon_config::OAuthSettings;

use crate::{
    Error, Result,
    types::{OAuthTokens, TokenResponse},
};

/// Client for the mail provider's authorization-code and refresh grants.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    auth_url: String,
    token_url: String,
    redirect_uri: String,
    scopes: Vec<String>,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl OAuthClient {
    pub fn new(settings: &OAuthSettings) -> Self {
        Self::with_client(settings, reqwest::Client::new())
    }

    pub fn with_client(settings: &OAuthSettings, client: reqwest::Client) -> Self {
        Self {
            auth_url: settings.auth_url.clone(),
            token_url: settings.token_url.clone(),
            redirect_uri: settings.redirect_url.clone(),
            scopes: settings.scopes.clone(),
            request_timeout: settings.exchange_timeout(),
            client,
        }
    }

    /// Build the consent URL for `client_id`, requesting offline access so
    /// the provider issues a refresh token.
    pub fn authorization_url(&self, client_id: &str, state: &str) -> Result<String> {
        let mut url = Url::parse(&self.auth_url)?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("access_type", "offline")
            .append_pair("state", state);

        if !self.scopes.is_empty() {
            url.query_pairs_mut()
                .append_pair("scope", &self.scopes.join(" "));
        }

        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange(
        &self,
        client_id: &str,
        client_secret: &Secret<String>,
        code: &str,
    ) -> Result<OAuthTokens> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", client_id),
            ("client_secret", client_secret.expose_secret().as_str()),
        ];
        self.token_request("authorization code exchange", &form)
            .await
    }

    /// Trade a refresh token for a fresh access token.
    pub async fn refresh(
        &self,
        client_id: &str,
        client_secret: &Secret<String>,
        refresh_token: &Secret<String>,
    ) -> Result<OAuthTokens> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.expose_secret().as_str()),
            ("client_id", client_id),
            ("client_secret", client_secret.expose_secret().as_str()),
        ];
        self.token_request("token refresh", &form).await
    }

    /// POST `form` to the token endpoint. The whole round trip, body
    /// included, is bounded by the configured exchange timeout.
    async fn token_request(
        &self,
        operation: &'static str,
        form: &[(&str, &str)],
    ) -> Result<OAuthTokens> {
        debug!(operation, token_url = %self.token_url, "requesting tokens");

        let request = async {
            let resp = self.client.post(&self.token_url).form(form).send().await?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                warn!(operation, status = status.as_u16(), "token endpoint rejected request");
                return Err(Error::TokenEndpoint {
                    status: status.as_u16(),
                    body,
                });
            }
            let body: TokenResponse = resp.json().await?;
            Ok::<OAuthTokens, Error>(body.into())
        };

        tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| {
                warn!(operation, timeout = ?self.request_timeout, "token endpoint timed out");
                Error::Timeout {
                    operation,
                    elapsed: self.request_timeout,
                }
            })?
    }
}
