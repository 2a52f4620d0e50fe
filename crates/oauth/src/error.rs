use std::time::Duration;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors from credential storage and the mail-provider OAuth flow.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller-supplied input is structurally invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no credentials found for user {user_id}")]
    NotFound { user_id: String },

    /// The callback state is unknown, expired, or already used.
    #[error("invalid OAuth state")]
    InvalidState,

    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },

    #[error("{operation} timed out after {elapsed:?}")]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    /// The credentials file exists but cannot be parsed.
    #[error("credentials file {} is corrupt: {source}", path.display())]
    CorruptSnapshot {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Mapping(#[from] anyhow::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),
}

impl Error {
    #[must_use]
    pub fn not_found(user_id: impl Into<String>) -> Self {
        Self::NotFound {
            user_id: user_id.into(),
        }
    }

    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_) | Self::InvalidState | Self::NotFound { .. }
        )
    }
}
