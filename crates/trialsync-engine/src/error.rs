//! Error types for the sync engine.

use thiserror::Error;
use trialsync_client::VaultError;

/// Result type alias using `SyncError`.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can abort a sync run.
///
/// Per-record problems (validation rejections, malformed nested payloads)
/// are deliberately not represented here: they are routed to the failure
/// log or degraded to empty values and the run continues.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Remote API or transport failure.
    #[error(transparent)]
    Client(#[from] VaultError),

    /// CSV encoding or decoding failure.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Local file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Local state serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candidate template is unusable (missing file, missing columns).
    #[error("Template error: {0}")]
    Template(String),
}
