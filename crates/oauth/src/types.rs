use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Deserializer},
};

/// Tokens returned by the mail provider's token endpoint.
///
/// Access tokens are refreshed per delivery, so their lifetime is not kept.
#[derive(Clone)]
pub struct OAuthTokens {
    pub access_token: Secret<String>,
    /// Only present when the provider issues or rotates one.
    pub refresh_token: Option<Secret<String>>,
}

impl std::fmt::Debug for OAuthTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthTokens")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// Raw token endpoint response.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

impl From<TokenResponse> for OAuthTokens {
    fn from(resp: TokenResponse) -> Self {
        Self {
            access_token: Secret::new(resp.access_token),
            refresh_token: resp.refresh_token.filter(|t| !t.is_empty()).map(Secret::new),
        }
    }
}

// ── Serde helpers for Secret<String> ────────────────────────────────────────

/// Serialize a `Secret<String>` by exposing its inner value.
/// Use only for fields that must round-trip through storage.
pub fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

pub fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

/// Treat `null`, a missing field, and `""` alike as "no secret".
pub fn deserialize_option_secret<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Secret<String>>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()).map(Secret::new))
}
