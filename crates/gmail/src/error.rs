pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Gmail answered with a non-success status.
    #[error("gmail {operation} failed with HTTP {status}: {body}")]
    Api {
        operation: &'static str,
        status: u16,
        body: String,
    },

    /// The owner never finished the OAuth callback.
    #[error("no gmail refresh token stored for user {user_id}")]
    MissingRefreshToken { user_id: String },

    #[error("notification has no recipients")]
    NoRecipients,

    #[error(transparent)]
    Credentials(#[from] beacon_oauth::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
