//! One-time OAuth `state` tokens.
//!
//! A token maps to the user who started the flow until it is consumed by the
//! callback or its TTL runs out. Expiry is enforced lazily: expired entries are
//! swept whenever a new token is issued and rejected when presented.

use std::{collections::HashMap, sync::RwLock, time::Duration};

use {
    base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD},
    rand::RngCore,
    tokio::time::Instant,
    tracing::debug,
};

/// Token TTL used by the authorization flow.
pub const DEFAULT_STATE_TTL: Duration = Duration::from_secs(15 * 60);

/// Bytes of randomness per token (256 bits).
const STATE_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct PendingState {
    user_id: String,
    expires_at: Instant,
}

/// Registry of outstanding state tokens.
#[derive(Debug)]
pub struct StateTokenStore {
    ttl: Duration,
    states: RwLock<HashMap<String, PendingState>>,
}

impl Default for StateTokenStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_TTL)
    }
}

impl StateTokenStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            states: RwLock::new(HashMap::new()),
        }
    }

    /// Mint a fresh token bound to `user_id`.
    pub fn issue(&self, user_id: &str) -> String {
        let token = generate_state();
        let now = Instant::now();

        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        states.retain(|_, s| s.expires_at >= now);
        states.insert(token.clone(), PendingState {
            user_id: user_id.to_string(),
            expires_at: now + self.ttl,
        });
        debug!(user_id, pending = states.len(), "issued OAuth state");
        token
    }

    /// Validate and remove `token`, returning the user it was issued for.
    ///
    /// Unknown, expired, and already-consumed tokens all yield `None`.
    pub fn consume(&self, token: &str) -> Option<String> {
        let mut states = self.states.write().unwrap_or_else(|e| e.into_inner());
        let pending = states.remove(token)?;
        (Instant::now() <= pending.expires_at).then_some(pending.user_id)
    }

    /// Number of tokens currently held, including not-yet-swept expired ones.
    pub fn pending(&self) -> usize {
        self.states.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// 32 random bytes from the OS-seeded CSPRNG, base64url without padding.
pub fn generate_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
