//! Reference sets for cross-system validation.
//!
//! Rebuilt from scratch on every validation pass: the staleness window is
//! one run, and there is deliberately no cross-run caching.

use std::collections::{HashMap, HashSet};

use serde_json::Value;
use tracing::{info, warn};
use trialsync_client::VaultClient;

use crate::error::SyncResult;
use crate::record::{records_from_values, Record};

/// Active CDMS studies with their site lists embedded as a sub-query.
pub const CDMS_STUDY_SITE_QUERY: &str = "SELECT name__v, (SELECT name__v FROM sites__vr) AS sites__vr FROM study__v WHERE (status__v = 'active__v')";

/// User directory; the same query text serves both vaults.
pub const USER_DIRECTORY_QUERY: &str = "SELECT user_name__v, user_email__v FROM users";

/// Lookup collections used to validate a candidate batch.  Immutable for
/// the duration of one validation pass.
#[derive(Debug, Default)]
pub struct ReferenceSets {
    /// Study name to the set of site names registered under it.
    pub study_sites: HashMap<String, HashSet<String>>,
    /// User names known to the CDMS vault.
    pub cdms_users: HashSet<String>,
    /// User names known to the CTMS vault.
    pub ctms_users: HashSet<String>,
}

impl ReferenceSets {
    /// Fetch all reference collections fresh from both vaults.
    pub async fn fetch(cdms: &VaultClient, ctms: &VaultClient) -> SyncResult<Self> {
        let study_rows = records_from_values(cdms.query(CDMS_STUDY_SITE_QUERY).await?);
        let cdms_user_rows = records_from_values(cdms.query(USER_DIRECTORY_QUERY).await?);
        let ctms_user_rows = records_from_values(ctms.query(USER_DIRECTORY_QUERY).await?);
        let sets = Self::from_records(&study_rows, &cdms_user_rows, &ctms_user_rows);
        info!(
            studies = sets.study_sites.len(),
            cdms_users = sets.cdms_users.len(),
            ctms_users = sets.ctms_users.len(),
            "reference sets built"
        );
        Ok(sets)
    }

    /// Index already-fetched reference rows.  Pure; exercised directly by
    /// tests.
    #[must_use]
    pub fn from_records(
        study_rows: &[Record],
        cdms_user_rows: &[Record],
        ctms_user_rows: &[Record],
    ) -> Self {
        let mut study_sites = HashMap::new();
        for row in study_rows {
            let study = row.text("name__v");
            if study.is_empty() {
                continue;
            }
            let sites: HashSet<String> = subquery_names(row.get("sites__vr"), "name__v")
                .into_iter()
                .collect();
            study_sites.insert(study, sites);
        }

        Self {
            study_sites,
            cdms_users: user_names(cdms_user_rows),
            ctms_users: user_names(ctms_user_rows),
        }
    }
}

fn user_names(rows: &[Record]) -> HashSet<String> {
    rows.iter()
        .map(|row| row.text("user_name__v"))
        .filter(|name| !name.is_empty())
        .collect()
}

/// Extract the named field from an embedded sub-query payload.
///
/// Sub-query results arrive as `{"data": [{field: value}, ...]}`, sometimes
/// re-encoded as a JSON string.  Any malformed or absent shape yields an
/// empty list rather than an error: one bad nested payload must not abort
/// the whole reference build.  Order of appearance is preserved.
#[must_use]
pub fn subquery_names(payload: Option<&Value>, field: &str) -> Vec<String> {
    let Some(payload) = payload else {
        return Vec::new();
    };

    // Stringified payloads get one re-parse attempt.
    let reparsed;
    let payload = match payload {
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(value) => {
                reparsed = value;
                &reparsed
            }
            Err(e) => {
                warn!(field, error = %e, "unparsable sub-query payload, treating as empty");
                return Vec::new();
            }
        },
        other => other,
    };

    let Some(data) = payload.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    data.iter()
        .filter_map(|entry| entry.get(field))
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(ToString::to_string)
        .collect()
}
