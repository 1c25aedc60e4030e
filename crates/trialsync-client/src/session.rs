//! File-backed session token store.
//!
//! Session tokens are obtained out-of-band (the `auth` command) and read
//! once near the start of a run.  The store never refreshes a token itself;
//! an expired session aborts the run.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{VaultError, VaultResult};

/// Holds the location of a vault's persisted session token.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// Create a store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current session token.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::Session`] when the file is missing, unreadable,
    /// or empty.
    pub fn load(&self) -> VaultResult<String> {
        let raw = fs::read_to_string(&self.path).map_err(|e| {
            VaultError::Session(format!(
                "cannot read session file {}: {e}",
                self.path.display()
            ))
        })?;
        let token = raw.trim();
        if token.is_empty() {
            return Err(VaultError::Session(format!(
                "session file {} is empty",
                self.path.display()
            )));
        }
        debug!(path = %self.path.display(), "session token loaded");
        Ok(token.to_string())
    }

    /// Persist a freshly acquired session token.
    pub fn save(&self, token: &str) -> VaultResult<()> {
        fs::write(&self.path, token).map_err(|e| {
            VaultError::Session(format!(
                "cannot write session file {}: {e}",
                self.path.display()
            ))
        })
    }
}
