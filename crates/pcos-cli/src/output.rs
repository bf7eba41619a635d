//! Plain-text rendering of results and warnings.

use std::fmt::Write;

use pcos_core::models::{AnalysisOutcome, PatientRecord};
use pcos_core::session::SessionError;

/// Result block printed after a successful analysis.
pub fn render_outcome(outcome: &AnalysisOutcome) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Patient:          {} ({})", outcome.record.name, outcome.record.patient_id);
    let _ = writeln!(out, "Follicle count:   {}", outcome.follicle_count);
    let _ = writeln!(out, "Diagnosis:        {}", outcome.label);
    let _ = writeln!(out, "Confidence:       {:.2}%", outcome.confidence);

    if let (Some(prior), Some(comparison)) = (&outcome.prior, &outcome.comparison) {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "Previous result:  {} ({:.2}%, {} follicles) on {}",
            prior.last_prediction, prior.confidence, prior.follicle_count, prior.last_update
        );
        let _ = writeln!(out, "{}", comparison.message());
    }
    out
}

/// One-record summary for `show`.
pub fn render_record(record: &PatientRecord) -> String {
    format!(
        "{id}  {name}, {age}  {label} ({conf:.2}%)  follicles: {count}  updated: {updated}",
        id = record.patient_id,
        name = record.name,
        age = record.age,
        label = record.last_prediction,
        conf = record.confidence,
        count = record.follicle_count,
        updated = record.last_update,
    )
}

/// Warning text for submissions the user can correct.
pub fn render_warning(err: &SessionError) -> String {
    match err {
        SessionError::IdentityConflict(conflict) => format!(
            "Warning: patient id {} belongs to {}. Check the id before analyzing.",
            conflict.patient_id, conflict.stored_name
        ),
        other => format!("Warning: {}", other),
    }
}
