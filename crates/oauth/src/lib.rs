//! Per-user credential storage and the mail-provider OAuth flow.

pub mod authorization;
pub mod error;
pub mod flow;
pub mod state;
pub mod storage;
pub mod types;

pub use {
    authorization::{AuthorizationFlow, CredentialsRequest},
    error::{Error, Result},
    flow::OAuthClient,
    state::{DEFAULT_STATE_TTL, StateTokenStore, generate_state},
    storage::{CredentialStore, UserCredentials},
    types::{OAuthTokens, deserialize_option_secret, serialize_option_secret, serialize_secret},
};
