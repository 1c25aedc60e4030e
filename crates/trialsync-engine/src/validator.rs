//! Cross-system validation of candidate user-provisioning rows.
//!
//! A candidate must name a known study, only sites registered under that
//! study, and a user that exists in neither vault.  Study validity gates
//! everything else: an unknown study makes the site and user checks
//! meaningless in context, so checks run first-match-wins and each
//! rejection carries exactly one reason.

use std::fmt;

use crate::record::Record;
use crate::refsets::ReferenceSets;

/// Template column holding the candidate's user key.
pub const USER_NAME_COLUMN: &str = "User Name";
/// Template column holding the study name.
pub const STUDY_COLUMN: &str = "Study";
/// Template column holding the comma-separated site list.
pub const SITE_ACCESS_COLUMN: &str = "Site Access";

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Study field is empty or names no known study.
    UnknownStudy { study: String },
    /// One or more listed sites are not registered under the study.
    UnknownSites { study: String, sites: Vec<String> },
    /// User already exists in both vaults.
    ExistsInBoth,
    /// User already exists in the CDMS vault.
    ExistsInCdms,
    /// User already exists in the CTMS vault.
    ExistsInCtms,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::UnknownStudy { study } => {
                write!(f, "Study '{study}' does not exist")
            }
            RejectReason::UnknownSites { study, sites } => {
                write!(
                    f,
                    "Site(s) [{}] do not exist for study '{study}'",
                    sites.join(", ")
                )
            }
            RejectReason::ExistsInBoth => {
                write!(f, "User already exists in BOTH CDMS and CTMS")
            }
            RejectReason::ExistsInCdms => write!(f, "User already exists in CDMS"),
            RejectReason::ExistsInCtms => write!(f, "User already exists in CTMS"),
        }
    }
}

/// A rejected candidate with its single reason.
#[derive(Debug)]
pub struct Rejection {
    pub record: Record,
    pub reason: RejectReason,
}

/// Partition of a candidate batch.
#[derive(Debug, Default)]
pub struct ValidationOutcome {
    pub accepted: Vec<Record>,
    pub rejections: Vec<Rejection>,
}

/// Validate a candidate batch against the reference sets.
///
/// Order is preserved within both partitions.
#[must_use]
pub fn validate(batch: Vec<Record>, refs: &ReferenceSets) -> ValidationOutcome {
    let mut outcome = ValidationOutcome::default();
    for record in batch {
        match check(&record, refs) {
            None => outcome.accepted.push(record),
            Some(reason) => outcome.rejections.push(Rejection { record, reason }),
        }
    }
    outcome
}

/// First-match-wins checks; `None` means accepted.
fn check(record: &Record, refs: &ReferenceSets) -> Option<RejectReason> {
    let study = record.text(STUDY_COLUMN);
    let Some(allowed_sites) = refs.study_sites.get(&study) else {
        return Some(RejectReason::UnknownStudy { study });
    };

    let site_access = record.text(SITE_ACCESS_COLUMN);
    if !site_access.is_empty() {
        let missing: Vec<String> = site_access
            .split(',')
            .map(str::trim)
            .filter(|site| !site.is_empty() && !allowed_sites.contains(*site))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            return Some(RejectReason::UnknownSites {
                study,
                sites: missing,
            });
        }
    }

    let user_key = record.text(USER_NAME_COLUMN);
    let in_cdms = refs.cdms_users.contains(&user_key);
    let in_ctms = refs.ctms_users.contains(&user_key);
    match (in_cdms, in_ctms) {
        (true, true) => Some(RejectReason::ExistsInBoth),
        (true, false) => Some(RejectReason::ExistsInCdms),
        (false, true) => Some(RejectReason::ExistsInCtms),
        (false, false) => None,
    }
}
