use std::sync::Arc;

use {anyhow::Context, sqlx::SqlitePool};

use {
    beacon_common::{RetryPolicy, TeamMappingStore},
    beacon_config::BeaconConfig,
    beacon_gmail::{GmailClient, GmailTransport, NotificationDispatcher},
    beacon_oauth::{AuthorizationFlow, CredentialStore, OAuthClient},
    beacon_slack::{RecipientResolver, ResolverLimits, SlackClient},
};

use crate::relay::Relay;

/// Everything the HTTP handlers share.
pub struct GatewayState {
    pub relay: Arc<Relay>,
    pub auth: Arc<AuthorizationFlow>,
    pub teams: Arc<dyn TeamMappingStore>,
    /// Pinged by `/health`. `None` when mappings are not database-backed.
    pub db: Option<SqlitePool>,
}

impl GatewayState {
    pub fn new(
        relay: Arc<Relay>,
        auth: Arc<AuthorizationFlow>,
        teams: Arc<dyn TeamMappingStore>,
        db: Option<SqlitePool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            relay,
            auth,
            teams,
            db,
        })
    }

    /// Wire the production Slack and Gmail clients from configuration.
    pub fn from_config(
        config: &BeaconConfig,
        credentials: Arc<CredentialStore>,
        teams: Arc<dyn TeamMappingStore>,
        db: Option<SqlitePool>,
    ) -> anyhow::Result<Arc<Self>> {
        let resolver = Arc::new(RecipientResolver::new(
            Arc::new(SlackClient::new(&config.slack).context("building Slack client")?),
            Arc::clone(&credentials),
            ResolverLimits::from(&config.relay),
        ));

        let transport = GmailTransport::new(
            Arc::clone(&credentials),
            OAuthClient::new(&config.oauth),
            GmailClient::new(&config.gmail).context("building Gmail client")?,
        );
        let retry = RetryPolicy::new(config.relay.retry_attempts, config.relay.initial_backoff());
        let dispatcher = Arc::new(NotificationDispatcher::new(Arc::new(transport), retry));

        let relay = Arc::new(Relay::new(
            Arc::clone(&teams),
            resolver,
            dispatcher,
            config.relay.subject.clone(),
            config.relay.event_deadline(),
        ));
        let auth = Arc::new(AuthorizationFlow::new(
            &config.oauth,
            credentials,
            Arc::clone(&teams),
        ));

        Ok(Self::new(relay, auth, teams, db))
    }
}
