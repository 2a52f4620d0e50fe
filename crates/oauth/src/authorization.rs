//! Two-phase mail authorization.
//!
//! Phase 1 stores the caller's platform and mail client credentials, maps the
//! Slack team to the user, and hands back a consent URL carrying a one-time
//! state token. Phase 2 consumes that token on the provider's callback,
//! exchanges the code, and merges the refresh token into the stored record.

use std::sync::Arc;

use {
    secrecy::Secret,
    serde::Deserialize,
    tracing::{info, warn},
};

use {beacon_common::TeamMappingStore, beacon_config::OAuthSettings};

use crate::{
    Error, Result,
    flow::OAuthClient,
    state::StateTokenStore,
    storage::{CredentialStore, UserCredentials},
};

/// Phase-1 request body.
#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub user_id: String,
    pub gmail_client_id: String,
    pub gmail_secret: Secret<String>,
    pub slack_bot_token: Secret<String>,
    #[serde(default)]
    pub slack_team_id: Option<String>,
}

impl std::fmt::Debug for CredentialsRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsRequest")
            .field("user_id", &self.user_id)
            .field("gmail_client_id", &self.gmail_client_id)
            .field("gmail_secret", &"[REDACTED]")
            .field("slack_bot_token", &"[REDACTED]")
            .field("slack_team_id", &self.slack_team_id)
            .finish()
    }
}

pub struct AuthorizationFlow {
    client: OAuthClient,
    states: StateTokenStore,
    credentials: Arc<CredentialStore>,
    teams: Arc<dyn TeamMappingStore>,
    success_url: String,
}

impl AuthorizationFlow {
    pub fn new(
        settings: &OAuthSettings,
        credentials: Arc<CredentialStore>,
        teams: Arc<dyn TeamMappingStore>,
    ) -> Self {
        Self {
            client: OAuthClient::new(settings),
            states: StateTokenStore::new(settings.state_ttl()),
            credentials,
            teams,
            success_url: settings.success_url.clone(),
        }
    }

    /// Phase 1: persist credentials, register the team, return the consent URL.
    pub async fn initiate(&self, req: CredentialsRequest) -> Result<String> {
        if req.user_id.trim().is_empty() {
            return Err(Error::InvalidRequest("user_id is required".into()));
        }
        if req.gmail_client_id.trim().is_empty() {
            return Err(Error::InvalidRequest("gmail_client_id is required".into()));
        }

        let user_id = req.user_id.clone();
        self.credentials.save(UserCredentials {
            user_id: req.user_id,
            slack_bot_token: req.slack_bot_token,
            gmail_client_id: req.gmail_client_id.clone(),
            gmail_secret: req.gmail_secret,
            gmail_refresh_token: None,
        })?;

        if let Some(team_id) = req.slack_team_id.as_deref().filter(|t| !t.is_empty()) {
            self.teams.register(team_id, &user_id).await?;
            info!(team_id, user_id = %user_id, "registered team mapping");
        }

        let state = self.states.issue(&user_id);
        let url = self.client.authorization_url(&req.gmail_client_id, &state)?;
        info!(user_id = %user_id, "authorization URL issued");
        Ok(url)
    }

    /// Phase 2: validate `state`, exchange `code`, store the refresh token.
    ///
    /// Returns the URL the browser should be redirected to.
    pub async fn complete(&self, state: &str, code: &str) -> Result<String> {
        let user_id = self.states.consume(state).ok_or(Error::InvalidState)?;
        if code.is_empty() {
            return Err(Error::InvalidRequest("missing authorization code".into()));
        }
        let creds = self.credentials.get(&user_id)?;

        let tokens = self
            .client
            .exchange(&creds.gmail_client_id, &creds.gmail_secret, code)
            .await?;

        match tokens.refresh_token {
            Some(refresh_token) => {
                self.credentials.update(&user_id, move |c| {
                    c.gmail_refresh_token = Some(refresh_token);
                })?;
                info!(user_id = %user_id, "stored mail refresh token");
            },
            None => warn!(
                user_id = %user_id,
                "token exchange returned no refresh token, keeping existing credentials"
            ),
        }

        Ok(self.success_url.clone())
    }
}
