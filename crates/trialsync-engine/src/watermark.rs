//! Per-stream high-water-mark persistence.
//!
//! Each entity stream records the maximum modification timestamp of its
//! most recently completed sync.  The next run queries only records
//! modified after that mark.  The mark is advanced only after the batch is
//! durably exported, so a crashed run re-fetches the same range.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::error::SyncResult;
use crate::record::Record;

/// Timestamp used when a stream has no stored watermark or the backing
/// store is unavailable: a wide re-sync is acceptable, silent data loss is
/// not.
pub const WATERMARK_FALLBACK: &str = "2000-01-01T00:00:00.000Z";

/// Persistent store of `(stream_id, last_modified_timestamp)` pairs.
pub trait WatermarkStore {
    /// Watermark for a stream, or the fallback when absent/unavailable.
    fn get(&self, stream_id: &str) -> String;

    /// Advance a stream's watermark.  Implementations must be monotonic:
    /// a timestamp at or below the stored one is ignored.
    fn set(&mut self, stream_id: &str, timestamp: &str) -> SyncResult<()>;
}

/// JSON-file backed watermark store.
///
/// The file holds one object mapping stream ids to RFC 3339 timestamps.
/// Read failures degrade to [`WATERMARK_FALLBACK`] rather than failing the
/// run.
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    path: PathBuf,
}

impl FileWatermarkStore {
    /// Create a store backed by the given file.  The file is created on
    /// first `set`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> BTreeMap<String, String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(map) => map,
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "watermark file is malformed, treating all streams as unset"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "watermark file unreadable, falling back to full range"
                );
                BTreeMap::new()
            }
        }
    }
}

impl WatermarkStore for FileWatermarkStore {
    fn get(&self, stream_id: &str) -> String {
        self.read_all()
            .get(stream_id)
            .cloned()
            .unwrap_or_else(|| WATERMARK_FALLBACK.to_string())
    }

    fn set(&mut self, stream_id: &str, timestamp: &str) -> SyncResult<()> {
        let mut all = self.read_all();
        if let Some(current) = all.get(stream_id) {
            // RFC 3339 timestamps in UTC order lexicographically.
            if timestamp <= current.as_str() {
                debug!(
                    stream = stream_id,
                    current, candidate = timestamp,
                    "watermark not advanced (candidate is not newer)"
                );
                return Ok(());
            }
        }
        all.insert(stream_id.to_string(), timestamp.to_string());
        fs::write(&self.path, serde_json::to_string_pretty(&all)?.as_bytes())?;
        debug!(stream = stream_id, watermark = timestamp, "watermark advanced");
        Ok(())
    }
}

/// Maximum modification timestamp across a fetched batch.
///
/// Values that fail to parse as RFC 3339 are skipped with a warning; the
/// original string form of the maximum is returned so the stored mark
/// matches what the vault emitted.
#[must_use]
pub fn max_modified(records: &[Record], modified_field: &str) -> Option<String> {
    let mut max: Option<(DateTime<Utc>, String)> = None;
    for record in records {
        let raw = record.text(modified_field);
        if raw.is_empty() {
            continue;
        }
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(parsed) => {
                let parsed = parsed.with_timezone(&Utc);
                if max.as_ref().map_or(true, |(current, _)| parsed > *current) {
                    max = Some((parsed, raw));
                }
            }
            Err(e) => {
                warn!(field = modified_field, value = raw, error = %e, "unparsable modification timestamp skipped");
            }
        }
    }
    max.map(|(_, raw)| raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(ts: &str) -> Record {
        Record::from_value(json!({ "modified_date__v": ts })).unwrap()
    }

    #[test]
    fn get_defaults_to_fallback_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileWatermarkStore::new(dir.path().join("watermarks.json"));
        assert_eq!(store.get("ctms-studies"), WATERMARK_FALLBACK);
    }

    #[test]
    fn get_defaults_to_fallback_when_file_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watermarks.json");
        fs::write(&path, "not json at all").unwrap();
        let store = FileWatermarkStore::new(path);
        assert_eq!(store.get("ctms-users"), WATERMARK_FALLBACK);
    }

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileWatermarkStore::new(dir.path().join("watermarks.json"));
        store
            .set("ctms-studies", "2026-03-01T12:00:00.000Z")
            .unwrap();
        assert_eq!(store.get("ctms-studies"), "2026-03-01T12:00:00.000Z");
        // Other streams stay at the fallback.
        assert_eq!(store.get("ctms-users"), WATERMARK_FALLBACK);
    }

    #[test]
    fn set_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileWatermarkStore::new(dir.path().join("watermarks.json"));
        store
            .set("ctms-studies", "2026-03-01T12:00:00.000Z")
            .unwrap();
        store
            .set("ctms-studies", "2025-01-01T00:00:00.000Z")
            .unwrap();
        assert_eq!(store.get("ctms-studies"), "2026-03-01T12:00:00.000Z");
    }

    #[test]
    fn max_modified_picks_latest_and_skips_garbage() {
        let records = vec![
            record("2026-01-02T00:00:00.000Z"),
            record("not-a-timestamp"),
            record("2026-04-01T08:30:00.000Z"),
            record("2026-02-15T00:00:00.000Z"),
        ];
        assert_eq!(
            max_modified(&records, "modified_date__v").as_deref(),
            Some("2026-04-01T08:30:00.000Z")
        );
    }

    #[test]
    fn max_modified_of_empty_batch_is_none() {
        assert!(max_modified(&[], "modified_date__v").is_none());
        let no_field = vec![Record::from_value(json!({"name__v": "S1"})).unwrap()];
        assert!(max_modified(&no_field, "modified_date__v").is_none());
    }
}
