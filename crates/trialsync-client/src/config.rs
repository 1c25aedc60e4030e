//! Per-vault configuration loaded from the environment.
//!
//! Each remote system (CTMS, CDMS) is configured through a prefixed set of
//! environment variables, e.g. `CTMS_URL` / `CDMS_URL`.  Configuration is
//! constructed once per run and passed into the components that need it;
//! nothing reads the environment at module load time.

use std::path::PathBuf;

/// Configuration for one Vault endpoint.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Base URL of the vault, e.g. `https://myvault.veevavault.com`.
    pub base_url: String,

    /// API version segment, e.g. `v24.1`.
    pub api_version: String,

    /// Path of the file holding the current session token.
    pub session_file: PathBuf,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl VaultConfig {
    /// Load configuration for the given system prefix (`CTMS` or `CDMS`)
    /// from environment variables.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_reader(prefix, |key| std::env::var(key))
    }

    /// Load configuration from a custom variable reader.
    ///
    /// This allows tests to supply variables without mutating process-global
    /// environment state.
    pub fn from_reader<F>(prefix: &str, reader: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let url_var = format!("{prefix}_URL");
        let base_url = reader(&url_var)
            .map_err(|_| ConfigError::MissingVar(url_var))?
            .trim_end_matches('/')
            .to_string();

        let api_version = reader(&format!("{prefix}_API_VERSION"))
            .unwrap_or_else(|_| "v24.1".to_string());

        let session_file = reader(&format!("{prefix}_SESSION_FILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                PathBuf::from(format!("{}_session_id.txt", prefix.to_lowercase()))
            });

        let timeout_var = format!("{prefix}_TIMEOUT_SECS");
        let request_timeout_secs = match reader(&timeout_var) {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue(timeout_var, e.to_string()))?,
            Err(_) => 30,
        };

        Ok(Self {
            base_url,
            api_version,
            session_file,
            request_timeout_secs,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}
