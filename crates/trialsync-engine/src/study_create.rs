//! CDMS study creation, fed by the exported CTMS study store.
//!
//! For each exported study the pipeline submits a creation request, waits
//! for the backend to register it, then confirms the study master exists.
//! Rows that fail either step land in the failure log and processing
//! continues; an expired session aborts the whole run.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};
use trialsync_client::{VaultClient, VaultError};

use crate::error::{SyncError, SyncResult};
use crate::export::FailureLog;
use crate::record::Record;

/// CDMS design action that submits a study creation.
pub const STUDY_CREATE_PATH: &str = "app/cdm/design/actions/create_study";

/// CDMS design endpoint listing registered study masters.
pub const STUDY_MASTERS_PATH: &str = "app/cdm/design/study_masters";

#[derive(Debug, Serialize)]
struct CreateStudyRequest<'a> {
    study_master_name: &'a str,
    organization_name: &'a str,
    external_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct StudyMastersResponse {
    #[serde(default)]
    study_masters: Vec<Value>,
}

/// Tunables of one study-creation run.
#[derive(Debug, Clone)]
pub struct StudyCreateSettings {
    /// Organization the studies are created under.
    pub organization_name: String,
    /// Wait between submission and the existence check, giving the backend
    /// time to register the study.
    pub registration_delay: Duration,
    /// Wait between rows.
    pub pacing_delay: Duration,
}

impl StudyCreateSettings {
    pub fn new(organization_name: impl Into<String>) -> Self {
        Self {
            organization_name: organization_name.into(),
            registration_delay: Duration::from_secs(3),
            pacing_delay: Duration::from_secs(5),
        }
    }
}

/// Outcome of one study-creation run.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StudyCreateReport {
    /// Studies submitted and verified registered.
    pub created: usize,
    /// Studies logged to the failure log.
    pub failed: usize,
    /// Rows skipped for missing identifiers.
    pub skipped: usize,
}

/// Read the exported study store into records.
///
/// The columns the pipeline depends on must be present in the header.
pub fn read_study_export(path: &Path) -> SyncResult<Vec<Record>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        SyncError::Template(format!("cannot read study export {}: {e}", path.display()))
    })?;
    let headers = reader
        .headers()
        .map_err(|e| SyncError::Template(format!("study export has no header row: {e}")))?
        .clone();

    for required in ["name__v", "external_id__v", "global_id__sys"] {
        if !headers.iter().any(|h| h == required) {
            return Err(SyncError::Template(format!(
                "study export is missing required column '{required}'"
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

/// Run the study-creation pipeline against the CDMS.
pub async fn run_study_create(
    cdms: &VaultClient,
    export_path: &Path,
    failures: &FailureLog,
    settings: &StudyCreateSettings,
) -> SyncResult<StudyCreateReport> {
    let studies = read_study_export(export_path)?;
    if studies.is_empty() {
        info!(export = %export_path.display(), "study export holds no rows");
        return Ok(StudyCreateReport::default());
    }
    info!(studies = studies.len(), "creating studies in CDMS");

    let mut report = StudyCreateReport::default();
    for study in &studies {
        let name = study.text("name__v");
        let external_id = study.text("external_id__v");
        let global_id = study.text("global_id__sys");

        if name.is_empty() || global_id.is_empty() {
            warn!(name = %name, external_id = %external_id, "row skipped, missing identifiers");
            failures.append(&name, &external_id, "Missing study name or global id")?;
            report.skipped += 1;
            continue;
        }

        let submitted = submit_creation(cdms, &name, &external_id, settings).await?;
        tokio::time::sleep(settings.registration_delay).await;

        if verify_registered(cdms, &name).await? {
            info!(study = %name, "study registered in CDMS");
            report.created += 1;
        } else {
            let reason = if submitted {
                "Created but not found"
            } else {
                "Creation request failed"
            };
            warn!(study = %name, reason, "study not registered");
            failures.append(&name, &external_id, reason)?;
            report.failed += 1;
        }

        tokio::time::sleep(settings.pacing_delay).await;
    }

    info!(
        created = report.created,
        failed = report.failed,
        skipped = report.skipped,
        "study creation finished"
    );
    Ok(report)
}

/// Submit one creation request.  Per-study API failures are reported back
/// as `false` so the existence check can still classify the row; an
/// expired session aborts.
async fn submit_creation(
    cdms: &VaultClient,
    name: &str,
    external_id: &str,
    settings: &StudyCreateSettings,
) -> SyncResult<bool> {
    let payload = CreateStudyRequest {
        study_master_name: name,
        organization_name: &settings.organization_name,
        external_id,
    };
    match cdms.post_json::<Value, _>(STUDY_CREATE_PATH, &payload).await {
        Ok(_) => Ok(true),
        Err(VaultError::SessionExpired) => Err(VaultError::SessionExpired.into()),
        Err(e) => {
            warn!(study = %name, error = %e, "creation submission failed");
            Ok(false)
        }
    }
}

/// Whether a study master with the given name is registered.
async fn verify_registered(cdms: &VaultClient, name: &str) -> SyncResult<bool> {
    let lookup = cdms
        .get_json::<StudyMastersResponse>(STUDY_MASTERS_PATH, &[("study_master_name", name)])
        .await;
    match lookup {
        Ok(response) => Ok(!response.study_masters.is_empty()),
        Err(VaultError::SessionExpired) => Err(VaultError::SessionExpired.into()),
        Err(e) => {
            warn!(study = %name, error = %e, "existence check failed");
            Ok(false)
        }
    }
}
