//! Error types for collaborator calls

/// Errors from the token endpoint or the remote mailbox.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("mailbox error: {0}")]
    Mailbox(String),
}

/// Result alias for collaborator operations.
pub type Result<T> = std::result::Result<T, Error>;
