//! Incremental sync and cross-system provisioning engine.
//!
//! The engine pulls modified records from a CTMS and a CDMS vault through
//! [`trialsync_client`], reshapes them into stable CSV exports, tracks
//! per-stream watermarks, and validates user-provisioning candidates
//! against both systems before submitting them.

pub mod error;
pub mod export;
pub mod import;
pub mod orchestrator;
pub mod record;
pub mod refsets;
pub mod study_create;
pub mod transform;
pub mod validator;
pub mod watermark;

pub use error::{SyncError, SyncResult};
pub use export::{CsvStore, FailureLog};
pub use import::{run_import, ImportReport};
pub use orchestrator::{incremental_query, streams, RunSummary, StreamDefinition, SyncRun};
pub use record::{records_from_values, Record};
pub use refsets::ReferenceSets;
pub use study_create::{run_study_create, StudyCreateReport, StudyCreateSettings};
pub use validator::{validate, RejectReason, Rejection, ValidationOutcome};
pub use watermark::{max_modified, FileWatermarkStore, WatermarkStore, WATERMARK_FALLBACK};
