use std::sync::Arc;

use {async_trait::async_trait, secrecy::Secret, tracing::debug};

use beacon_oauth::{CredentialStore, OAuthClient};

use crate::{
    client::GmailClient,
    error::{Error, Result},
};

/// The three mail-service calls a delivery needs.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Fresh access token for `owner_id`'s mailbox.
    async fn access_token(&self, owner_id: &str) -> Result<Secret<String>>;

    /// Address the access token sends as.
    async fn sender_address(&self, access_token: &Secret<String>) -> Result<String>;

    /// Submit a base64url-encoded message, returning the provider's ID.
    async fn submit(&self, access_token: &Secret<String>, raw: &str) -> Result<String>;
}

/// Gmail transport backed by the credential store's refresh tokens.
pub struct GmailTransport {
    credentials: Arc<CredentialStore>,
    oauth: OAuthClient,
    gmail: GmailClient,
}

impl GmailTransport {
    pub fn new(credentials: Arc<CredentialStore>, oauth: OAuthClient, gmail: GmailClient) -> Self {
        Self {
            credentials,
            oauth,
            gmail,
        }
    }
}

#[async_trait]
impl MailTransport for GmailTransport {
    async fn access_token(&self, owner_id: &str) -> Result<Secret<String>> {
        let creds = self.credentials.get(owner_id)?;
        let refresh_token = creds
            .gmail_refresh_token
            .as_ref()
            .ok_or_else(|| Error::MissingRefreshToken {
                user_id: owner_id.to_string(),
            })?;

        let tokens = self
            .oauth
            .refresh(&creds.gmail_client_id, &creds.gmail_secret, refresh_token)
            .await?;

        if let Some(rotated) = tokens.refresh_token {
            debug!(user_id = %owner_id, "provider rotated refresh token");
            self.credentials.update(owner_id, |c| {
                c.gmail_refresh_token = Some(rotated);
            })?;
        }
        Ok(tokens.access_token)
    }

    async fn sender_address(&self, access_token: &Secret<String>) -> Result<String> {
        self.gmail.profile_email(access_token).await
    }

    async fn submit(&self, access_token: &Secret<String>, raw: &str) -> Result<String> {
        self.gmail.send_raw(access_token, raw).await
    }
}
