//! Pure record reshaping: vault field names to import-template columns.
//!
//! No I/O happens here.  All renames, role mappings, and defaults are
//! declarative constant tables so the output shape is stable regardless of
//! what the query returned.

use crate::record::Record;
use crate::refsets::subquery_names;

/// CTMS team role to CDMS study role.  Unmapped roles normalize to an
/// empty value, never an error.
pub const ROLE_MAP: &[(&str, &str)] = &[
    ("Deputy Investigator", "CDMS Principal Investigator"),
    ("Laboratory Staff", "CDMS Clinical Research Coordinator"),
    ("Principal Investigator", "CDMS Principal Investigator"),
    (
        "Regulatory Document Co-ordinator",
        "CDMS Clinical Research Coordinator",
    ),
    ("Study Co-ordinator", "CDMS Clinical Research Coordinator"),
    ("Study Nurse", "CDMS Clinical Research Coordinator"),
    ("Subinvestigator", "CDMS Principal Investigator"),
];

/// Vault field name to import-template column name.
const RENAME_MAP: &[(&str, &str)] = &[
    ("email__clin", "Email"),
    ("name__v", "Full Name"),
    ("last_name__v", "Last Name"),
    ("first_name__v", "First Name"),
    ("person_type__cr.name__v", "Person Type"),
    ("team_role__vr.name__v", "Team Role"),
    ("site_connect_user__v", "Site Connect User"),
    ("study__clinr.name__v", "Study"),
    ("study__clinr.status__v", "Study Status"),
    ("study_country__clinr.name__v", "Country Access"),
    ("site__clinr.name__v", "Site Access"),
    ("start_date__clin", "Activation Date"),
    ("end_date__clin", "End Date"),
    ("state__v", "State"),
];

/// Declarative defaults synthesized onto every normalized row.
const DEFAULT_COLUMNS: &[(&str, &str)] = &[
    ("User Type", "Site"),
    ("Title", ""),
    ("Federated ID", ""),
    ("Company", ""),
    ("Language", "en"),
    ("Locale", "en_GB"),
    (
        "Timezone",
        "(GMT+01:00) Central European Time (Europe/Berlin)",
    ),
    ("Cross Study Role", ""),
    ("Send Welcome Email", "Yes"),
    ("Add as Principal Investigator", "No"),
    ("Access to All Environments", "No"),
    ("Access to All Sites", "No"),
    ("Study Access", "Enabled"),
    ("Country Access", ""),
    ("Ignore LMS Status", "No"),
    ("Domain Administrator", ""),
    ("Service Availability Notifications", "No"),
    ("Product Announcement Emails", "No"),
    ("Status", "Active"),
    ("Security Policy", "VeevaId"),
];

/// Source-only columns dropped after the derived values are computed.
const DROPPED_COLUMNS: &[&str] = &[
    "Person Type",
    "Team Role",
    "Site Connect User",
    "Study Status",
    "End Date",
    "State",
];

/// Template column that uniquely keys a provisioning candidate.
pub const IMPORT_KEY_COLUMN: &str = "User Name";

/// The complete import-template column set, in its one fixed, total order.
pub const IMPORT_COLUMNS: &[&str] = &[
    "User Name",
    "Email",
    "User Type",
    "Title",
    "Last Name",
    "First Name",
    "Company",
    "Federated ID",
    "Language",
    "Locale",
    "Timezone",
    "Security Policy",
    "Cross Study Role",
    "Activation Date",
    "Send Welcome Email",
    "Add as Principal Investigator",
    "Study",
    "Study Environment",
    "Access to All Environments",
    "Study Role",
    "Access to All Sites",
    "Study Access",
    "Country Access",
    "Site Access",
    "Ignore LMS Status",
    "Domain Administrator",
    "Service Availability Notifications",
    "Product Announcement Emails",
    "Status",
];

/// Map a CTMS team role to its CDMS study role, empty when unmapped.
#[must_use]
pub fn map_role(team_role: &str) -> &'static str {
    ROLE_MAP
        .iter()
        .find(|(source, _)| *source == team_role)
        .map_or("", |(_, target)| *target)
}

/// Normalize raw study-person rows into the import-template shape.
///
/// Every output record carries exactly the [`IMPORT_COLUMNS`] fields:
/// renamed source fields where present, derived values (study role, user
/// name, study environment), declarative defaults, and empty strings for
/// anything the input lacked.
#[must_use]
pub fn normalize(records: Vec<Record>) -> Vec<Record> {
    records.into_iter().map(normalize_one).collect()
}

fn normalize_one(raw: Record) -> Record {
    let mut shaped = Record::new();

    for (source, target) in RENAME_MAP {
        shaped.set(target, raw.text(source));
    }

    shaped.set("Study Role", map_role(&shaped.text("Team Role")));
    shaped.set("User Name", shaped.text("Email"));
    shaped.set("Study Environment", shaped.text("Study"));

    for (column, value) in DEFAULT_COLUMNS {
        shaped.set(column, *value);
    }

    for column in DROPPED_COLUMNS {
        shaped.remove(column);
    }

    // Total column set: anything still missing becomes an empty value.
    let mut complete = Record::new();
    for column in IMPORT_COLUMNS {
        complete.set(column, shaped.text(column));
    }
    complete
}

/// Flatten the embedded `study_organizations__vr` sub-query payload of a
/// CTMS study row into a comma-joined `organization_names` column.
#[must_use]
pub fn flatten_organization_names(records: Vec<Record>) -> Vec<Record> {
    records
        .into_iter()
        .map(|mut record| {
            let names = subquery_names(record.get("organization_names"), "organization__vr.name__v");
            record.set("organization_names", names.join(", "));
            record
        })
        .collect()
}
