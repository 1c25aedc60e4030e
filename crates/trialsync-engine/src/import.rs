//! User-import provisioning: read a candidate template, validate it against
//! both vaults, log rejections, and submit the survivors to the CDMS
//! user-import endpoint.

use std::path::Path;

use serde_json::{json, Value};
use tracing::{info, warn};
use trialsync_client::VaultClient;

use crate::error::{SyncError, SyncResult};
use crate::export::FailureLog;
use crate::record::Record;
use crate::refsets::ReferenceSets;
use crate::validator::{self, ValidationOutcome};

/// CDMS application endpoint accepting a batch of users to provision.
pub const USER_IMPORT_PATH: &str = "app/cdm/users_json";

/// Outcome of one import run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Candidates submitted to the CDMS.
    pub submitted: usize,
    /// Candidates rejected by validation and logged.
    pub rejected: usize,
}

/// Read the candidate template CSV into records.
///
/// The columns validation depends on must be present in the header; an
/// unreadable or structurally unusable template aborts the run.
pub fn read_template(path: &Path) -> SyncResult<Vec<Record>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        SyncError::Template(format!("cannot read template {}: {e}", path.display()))
    })?;
    let headers = reader
        .headers()
        .map_err(|e| SyncError::Template(format!("template has no header row: {e}")))?
        .clone();

    for required in [
        validator::USER_NAME_COLUMN,
        validator::STUDY_COLUMN,
        validator::SITE_ACCESS_COLUMN,
    ] {
        if !headers.iter().any(|h| h == required) {
            return Err(SyncError::Template(format!(
                "template is missing required column '{required}'"
            )));
        }
    }

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let mut record = Record::new();
        for (column, value) in headers.iter().zip(row.iter()) {
            record.set(column, value);
        }
        records.push(record);
    }
    Ok(records)
}

/// Shape the accepted candidates into the import endpoint's payload.
#[must_use]
pub fn build_payload(accepted: &[Record], append_site_country_access: bool) -> Value {
    json!({
        "append_site_country_access": append_site_country_access,
        "users": accepted,
    })
}

/// Run the full import pipeline.
///
/// Every rejection lands in the failure log with its single reason; the
/// submission only happens when at least one candidate survives.
pub async fn run_import(
    cdms: &VaultClient,
    ctms: &VaultClient,
    template_path: &Path,
    failures: &FailureLog,
    append_site_country_access: bool,
) -> SyncResult<ImportReport> {
    let candidates = read_template(template_path)?;
    if candidates.is_empty() {
        info!(template = %template_path.display(), "template holds no candidates");
        return Ok(ImportReport::default());
    }
    info!(candidates = candidates.len(), "validating import candidates");

    let refs = ReferenceSets::fetch(cdms, ctms).await?;
    let ValidationOutcome {
        accepted,
        rejections,
    } = validator::validate(candidates, &refs);

    for rejection in &rejections {
        let user = rejection.record.text(validator::USER_NAME_COLUMN);
        let study = rejection.record.text(validator::STUDY_COLUMN);
        let reason = rejection.reason.to_string();
        warn!(user = %user, study = %study, reason = %reason, "candidate rejected");
        failures.append(&user, &study, &reason)?;
    }

    if accepted.is_empty() {
        info!(rejected = rejections.len(), "no candidates left to submit");
        return Ok(ImportReport {
            submitted: 0,
            rejected: rejections.len(),
        });
    }

    let payload = build_payload(&accepted, append_site_country_access);
    let response: Value = cdms.post_json(USER_IMPORT_PATH, &payload).await?;
    log_import_response(&response);

    info!(
        submitted = accepted.len(),
        rejected = rejections.len(),
        "import submitted"
    );
    Ok(ImportReport {
        submitted: accepted.len(),
        rejected: rejections.len(),
    })
}

/// Surface per-candidate outcomes from the endpoint's response, when the
/// response carries them.
fn log_import_response(response: &Value) {
    let Some(entries) = response.get("data").and_then(Value::as_array) else {
        info!(response = %response, "import response");
        return;
    };
    for entry in entries {
        let user = entry
            .get("user_name__v")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>");
        let status = entry
            .get("responseStatus")
            .and_then(Value::as_str)
            .unwrap_or("<unknown>");
        if status.eq_ignore_ascii_case("success") {
            info!(user, status, "user provisioned");
        } else {
            warn!(user, status, detail = %entry, "user not provisioned");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;

    #[test]
    fn read_template_builds_records_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.csv");
        fs::write(
            &path,
            "User Name,Study,Site Access,Email\n\
             jdoe@example.com,S1,\"Site-X, Site-Y\",jdoe@example.com\n",
        )
        .unwrap();

        let records = read_template(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].text("User Name"), "jdoe@example.com");
        assert_eq!(records[0].text("Site Access"), "Site-X, Site-Y");
    }

    #[test]
    fn read_template_rejects_missing_required_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.csv");
        fs::write(&path, "User Name,Email\njdoe@example.com,jdoe@example.com\n").unwrap();

        let err = read_template(&path).unwrap_err();
        assert!(matches!(err, SyncError::Template(ref msg) if msg.contains("Study")));
    }

    #[test]
    fn read_template_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_template(&dir.path().join("absent.csv")).unwrap_err();
        assert!(matches!(err, SyncError::Template(_)));
    }

    #[test]
    fn payload_carries_flag_and_users() {
        let accepted = vec![Record::from_value(json!({
            "User Name": "jdoe@example.com",
            "Study": "S1"
        }))
        .unwrap()];
        let payload = build_payload(&accepted, true);
        assert_eq!(payload["append_site_country_access"], json!(true));
        assert_eq!(payload["users"][0]["User Name"], json!("jdoe@example.com"));
    }
}
