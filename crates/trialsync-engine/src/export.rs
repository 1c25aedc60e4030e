//! CSV persistence: the append-only record store and the failure log.
//!
//! Both files are plain CSV so downstream tooling (and humans) can read
//! them.  Headers are written exactly once, when the file is created or
//! still empty; every later run appends data rows only.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::SyncResult;
use crate::record::Record;

/// Append-only CSV store for one entity stream.
///
/// The store doubles as the dedup index: `processed_keys` reads the key
/// column of every existing row, and the orchestrator skips records whose
/// key is already present.
#[derive(Debug, Clone)]
pub struct CsvStore {
    path: PathBuf,
    key_column: String,
}

impl CsvStore {
    pub fn new(path: impl Into<PathBuf>, key_column: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key_column: key_column.into(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keys of every record already persisted.  An absent file means
    /// nothing was processed yet.  Empty key values are not collected, so
    /// records without a key are never deduplicated against each other.
    pub fn processed_keys(&self) -> SyncResult<HashSet<String>> {
        if !self.path.exists() {
            return Ok(HashSet::new());
        }
        let mut reader = csv::Reader::from_path(&self.path)?;
        let headers = reader.headers()?.clone();
        let Some(key_index) = headers.iter().position(|h| h == self.key_column) else {
            // Header exists but the key column does not: treat as empty
            // rather than silently matching the wrong column.
            return Ok(HashSet::new());
        };

        let mut keys = HashSet::new();
        for row in reader.records() {
            let row = row?;
            if let Some(key) = row.get(key_index) {
                let key = key.trim();
                if !key.is_empty() {
                    keys.insert(key.to_string());
                }
            }
        }
        debug!(path = %self.path.display(), keys = keys.len(), "loaded processed keys");
        Ok(keys)
    }

    /// Append records under the given column order, writing the header
    /// first when the file is new.  Returns the number of rows written.
    pub fn append(&self, columns: &[&str], records: &[Record]) -> SyncResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let needs_header = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(columns)?;
        }
        for record in records {
            let row: Vec<String> = columns.iter().map(|column| record.text(column)).collect();
            writer.write_record(&row)?;
        }
        writer.flush()?;

        info!(path = %self.path.display(), rows = records.len(), "records appended");
        Ok(records.len())
    }
}

/// Append-only CSV log of rejected provisioning candidates.
#[derive(Debug, Clone)]
pub struct FailureLog {
    path: PathBuf,
}

const FAILURE_COLUMNS: &[&str] = &["identifier", "secondary_identifier", "reason"];

impl FailureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record one rejection.
    pub fn append(&self, identifier: &str, secondary: &str, reason: &str) -> SyncResult<()> {
        let needs_header = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
            Err(e) => return Err(e.into()),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(FAILURE_COLUMNS)?;
        }
        writer.write_record([identifier, secondary, reason])?;
        writer.flush()?;
        Ok(())
    }
}
