//! HTTP surface of the relay: Slack webhooks, the OAuth handshake, health
//! and debug endpoints, plus the SQLite team-mapping store.

pub mod auth_routes;
pub mod error;
pub mod relay;
pub mod server;
pub mod state;
pub mod team_store;

pub use {
    relay::{Relay, WebhookReply},
    server::{build_app, start_server},
    state::GatewayState,
    team_store::SqliteTeamMappingStore,
};
