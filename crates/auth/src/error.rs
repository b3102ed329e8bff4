//! Token lifecycle errors.

use thiserror::Error;

/// Failures along the token ladder.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No saved token material exists.
    #[error("no saved token")]
    NoToken,

    /// The profile probe was rejected by the broker.
    #[error("profile probe failed: {0}")]
    ProbeFailed(String),

    /// The refresh flow failed permanently.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// The refresh flow needs an operator-supplied PIN or a fresh login.
    #[error("interactive re-authentication required")]
    InteractiveRequired,

    /// Token store I/O failure.
    #[error("token store I/O error: {0}")]
    Io(String),

    /// Token store (de)serialization failure.
    #[error("token store format error: {0}")]
    Format(String),
}

impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(err: serde_json::Error) -> Self {
        Self::Format(err.to_string())
    }
}
