//! Error types for authentication operations

/// Errors from account loading and token refresh.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("account parse error: {0}")]
    AccountParse(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
