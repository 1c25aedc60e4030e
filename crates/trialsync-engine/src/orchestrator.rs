//! Incremental sync orchestration.
//!
//! A [`StreamDefinition`] is the declarative description of one entity
//! stream: what to query, which field carries the modification timestamp,
//! how to reshape the rows, and which column keys a row for dedup.
//! [`SyncRun`] executes one stream end to end: watermark in, fetch,
//! transform, dedup, append, watermark out.

use tracing::{info, warn};
use trialsync_client::{RetryPolicy, VaultClient};

use crate::error::SyncResult;
use crate::export::CsvStore;
use crate::record::{records_from_values, Record};
use crate::watermark::{max_modified, WatermarkStore};

/// Declarative description of one entity stream.
#[derive(Debug, Clone, Copy)]
pub struct StreamDefinition {
    /// Stable id used as the watermark key and in logs.
    pub stream_id: &'static str,
    /// Base query; must select `modified_field`.
    pub base_query: &'static str,
    /// Field carrying the record's modification timestamp.
    pub modified_field: &'static str,
    /// Post-transform column that uniquely keys a row.
    pub key_column: &'static str,
    /// Column order of the exported file.
    pub columns: &'static [&'static str],
    /// Reshaping applied between fetch and export.
    pub transform: fn(Vec<Record>) -> Vec<Record>,
}

/// The built-in entity streams.
pub mod streams {
    use super::StreamDefinition;
    use crate::record::Record;
    use crate::transform;

    fn passthrough(records: Vec<Record>) -> Vec<Record> {
        records
    }

    /// CTMS studies, with sponsor organizations flattened to one column.
    /// The export feeds the CDMS study-creation pipeline, which needs the
    /// external id alongside the natural key.
    pub const CTMS_STUDIES: StreamDefinition = StreamDefinition {
        stream_id: "ctms-studies",
        base_query: "SELECT name__v, status__v, external_id__v, global_id__sys, modified_date__v, \
                     (SELECT organization__vr.name__v FROM study_organizations__vr) AS organization_names \
                     FROM study__v",
        modified_field: "modified_date__v",
        key_column: "global_id__sys",
        columns: &[
            "name__v",
            "status__v",
            "external_id__v",
            "global_id__sys",
            "organization_names",
            "modified_date__v",
        ],
        transform: transform::flatten_organization_names,
    };

    const USER_QUERY: &str =
        "SELECT user_name__v, user_email__v, user_first_name__v, user_last_name__v, \
         status__v, modified_date__v FROM users";

    const USER_COLUMNS: &[&str] = &[
        "user_name__v",
        "user_email__v",
        "user_first_name__v",
        "user_last_name__v",
        "status__v",
        "modified_date__v",
    ];

    /// CTMS user directory.
    pub const CTMS_USERS: StreamDefinition = StreamDefinition {
        stream_id: "ctms-users",
        base_query: USER_QUERY,
        modified_field: "modified_date__v",
        key_column: "user_name__v",
        columns: USER_COLUMNS,
        transform: passthrough,
    };

    /// CDMS user directory.
    pub const CDMS_USERS: StreamDefinition = StreamDefinition {
        stream_id: "cdms-users",
        base_query: USER_QUERY,
        modified_field: "modified_date__v",
        key_column: "user_name__v",
        columns: USER_COLUMNS,
        transform: passthrough,
    };

    /// CTMS study-person assignments, normalized to the import-template
    /// shape.  Candidates are filtered server-side: no internal staff, only
    /// assignments whose study was active, and only the team roles that map
    /// to a CDMS study role.
    pub const CTMS_STUDY_PERSON: StreamDefinition = StreamDefinition {
        stream_id: "ctms-study-person",
        base_query: "SELECT email__clin, name__v, last_name__v, first_name__v, \
                     person_type__cr.name__v, team_role__vr.name__v, site_connect_user__v, \
                     study__clinr.name__v, study__clinr.status__v, \
                     study_country__clinr.name__v, site__clinr.name__v, \
                     start_date__clin, end_date__clin, state__v, modified_date__v \
                     FROM study_person__clin \
                     WHERE person_type__cr.name__v != 'Internal' \
                     AND previous_study_state__c = 'active__c' \
                     AND (team_role__vr.name__v = 'Deputy Investigator' \
                     OR team_role__vr.name__v = 'Laboratory Staff' \
                     OR team_role__vr.name__v = 'Principal Investigator' \
                     OR team_role__vr.name__v = 'Regulatory Document Co-ordinator' \
                     OR team_role__vr.name__v = 'Study Co-ordinator' \
                     OR team_role__vr.name__v = 'Study Nurse' \
                     OR team_role__vr.name__v = 'Subinvestigator')",
        modified_field: "modified_date__v",
        key_column: transform::IMPORT_KEY_COLUMN,
        columns: transform::IMPORT_COLUMNS,
        transform: transform::normalize,
    };
}

/// Narrow a base query to records modified after the watermark.
#[must_use]
pub fn incremental_query(base_query: &str, modified_field: &str, watermark: &str) -> String {
    if base_query.contains(" WHERE ") {
        format!("{base_query} AND ({modified_field} > '{watermark}')")
    } else {
        format!("{base_query} WHERE ({modified_field} > '{watermark}')")
    }
}

/// Outcome of one stream's sync.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Raw records the query returned.
    pub fetched: usize,
    /// Rows newly appended to the store.
    pub exported: usize,
    /// Rows skipped because their key was already processed.
    pub skipped: usize,
    /// Watermark the run advanced to, when it advanced at all.
    pub watermark: Option<String>,
}

/// One stream execution against one vault.
pub struct SyncRun<'a, W: WatermarkStore> {
    client: &'a VaultClient,
    watermarks: &'a mut W,
    retry: &'a RetryPolicy,
}

impl<'a, W: WatermarkStore> SyncRun<'a, W> {
    pub fn new(client: &'a VaultClient, watermarks: &'a mut W, retry: &'a RetryPolicy) -> Self {
        Self {
            client,
            watermarks,
            retry,
        }
    }

    /// Run one stream end to end.
    ///
    /// The watermark advances only after the batch is durably appended,
    /// and only to the maximum modification timestamp actually fetched: a
    /// crashed run re-fetches the same range, and the dedup pass makes the
    /// re-fetch harmless.  An empty fetch leaves the watermark untouched.
    pub async fn run(&mut self, stream: &StreamDefinition, store: &CsvStore) -> SyncResult<RunSummary> {
        let since = self.watermarks.get(stream.stream_id);
        let vql = incremental_query(stream.base_query, stream.modified_field, &since);
        info!(stream = stream.stream_id, since = %since, "sync started");

        let values = self
            .retry
            .execute(stream.stream_id, || self.client.query(&vql))
            .await?;
        let raw = records_from_values(values);
        let fetched = raw.len();

        if raw.is_empty() {
            info!(stream = stream.stream_id, "no modified records, watermark unchanged");
            return Ok(RunSummary::default());
        }

        // Computed on the raw batch: the transform may drop the field.
        let newest = max_modified(&raw, stream.modified_field);

        let shaped = (stream.transform)(raw);
        let processed = store.processed_keys()?;
        let mut fresh = Vec::with_capacity(shaped.len());
        let mut skipped = 0;
        for record in shaped {
            let key = record.text(stream.key_column);
            if !key.is_empty() && processed.contains(&key) {
                skipped += 1;
            } else {
                fresh.push(record);
            }
        }

        let exported = store.append(stream.columns, &fresh)?;

        let mut advanced = None;
        if let Some(timestamp) = newest {
            // Failure to persist the mark costs a re-fetch next run, not
            // the data just exported.
            match self.watermarks.set(stream.stream_id, &timestamp) {
                Ok(()) => advanced = Some(timestamp),
                Err(e) => {
                    warn!(stream = stream.stream_id, error = %e, "watermark not persisted");
                }
            }
        }

        info!(
            stream = stream.stream_id,
            fetched, exported, skipped, "sync finished"
        );
        Ok(RunSummary {
            fetched,
            exported,
            skipped,
            watermark: advanced,
        })
    }
}
