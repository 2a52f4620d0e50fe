/// Crate-wide result type for Slack operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Slack answered `ok: false`.
    #[error("slack {method} failed: {error}")]
    Api { method: &'static str, error: String },

    #[error("slack {method} returned HTTP {status}")]
    Status { method: &'static str, status: u16 },

    /// The response did not match the expected schema.
    #[error("slack {method} response malformed: {message}")]
    Decode {
        method: &'static str,
        message: String,
    },

    #[error("deadline exceeded while {0}")]
    DeadlineExceeded(&'static str),

    #[error(transparent)]
    Credentials(#[from] beacon_oauth::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    #[must_use]
    pub fn decode(method: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Decode {
            method,
            message: message.to_string(),
        }
    }
}
