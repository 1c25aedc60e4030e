//! Error types for the Vault API client.

use thiserror::Error;

/// Result type alias using `VaultError`.
pub type VaultResult<T> = Result<T, VaultError>;

/// Errors that can occur when interacting with a Vault instance.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session token is missing or unreadable.
    #[error("Session error: {0}")]
    Session(String),

    /// The API reported `INVALID_SESSION_ID`. The run must abort; the
    /// operator has to refresh the session out-of-band.
    #[error("Session expired, refresh it with the auth command")]
    SessionExpired,

    /// Network-level failure.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx, non-auth API response.
    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    /// The API returned error objects inside an otherwise successful
    /// response.
    #[error("Query error: {0}")]
    Query(String),

    /// Malformed response payload.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    /// Whether retrying the operation can plausibly succeed without
    /// operator intervention.
    ///
    /// Auth and query errors never qualify; transport failures and
    /// server-side 5xx responses do.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            VaultError::Transport(_) => true,
            VaultError::Api { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let error = VaultError::Api {
            status: 503,
            body: "service unavailable".into(),
        };
        assert!(error.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let error = VaultError::Api {
            status: 400,
            body: "bad query".into(),
        };
        assert!(!error.is_transient());
    }

    #[test]
    fn session_expired_is_not_transient() {
        assert!(!VaultError::SessionExpired.is_transient());
        assert!(!VaultError::Session("missing".into()).is_transient());
    }
}
