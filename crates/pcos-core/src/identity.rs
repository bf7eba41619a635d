//! Identity guard.
//!
//! A patient id that is already on file must come with the same name. This
//! stops a mistyped or colliding id from overwriting another person's history.

use crate::models::PatientRecord;

/// A submission whose name disagrees with the stored record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("patient id {patient_id} is already registered to {stored_name}")]
pub struct IdentityConflict {
    pub patient_id: String,
    pub stored_name: String,
}

/// Canonical form used for name comparison.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Names match when equal after trimming and case folding.
pub fn names_match(stored: &str, supplied: &str) -> bool {
    normalize_name(stored) == normalize_name(supplied)
}

/// Check a submitted name against the record currently on file.
pub fn check_identity(prior: Option<&PatientRecord>, name: &str) -> Result<(), IdentityConflict> {
    match prior {
        Some(record) if !names_match(&record.name, name) => Err(IdentityConflict {
            patient_id: record.patient_id.clone(),
            stored_name: record.name.clone(),
        }),
        _ => Ok(()),
    }
}
