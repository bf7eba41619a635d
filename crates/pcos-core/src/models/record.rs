//! Patient record models.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scores strictly above this value are labelled [`DiagnosticLabel::PcosDetected`].
pub const DECISION_THRESHOLD: f32 = 0.5;

/// Outcome of the PCOS classifier for one scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DiagnosticLabel {
    #[serde(rename = "PCOS Detected")]
    PcosDetected,
    #[serde(rename = "No PCOS Detected")]
    NoPcosDetected,
}

impl DiagnosticLabel {
    /// Label a classifier score in [0, 1].
    ///
    /// The comparison is strict: a score of exactly 0.5 is not a detection.
    pub fn from_score(score: f32) -> Self {
        if score > DECISION_THRESHOLD {
            DiagnosticLabel::PcosDetected
        } else {
            DiagnosticLabel::NoPcosDetected
        }
    }

    /// Display text, also used as the stored column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticLabel::PcosDetected => "PCOS Detected",
            DiagnosticLabel::NoPcosDetected => "No PCOS Detected",
        }
    }
}

impl fmt::Display for DiagnosticLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored label is not one of the known values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown diagnostic label: {0:?}")]
pub struct UnknownLabel(pub String);

impl FromStr for DiagnosticLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PCOS Detected" => Ok(DiagnosticLabel::PcosDetected),
            "No PCOS Detected" => Ok(DiagnosticLabel::NoPcosDetected),
            other => Err(UnknownLabel(other.to_string())),
        }
    }
}

/// Convert a classifier score to a percentage confidence.
pub fn confidence_percent(score: f32) -> f64 {
    f64::from(score) * 100.0
}

/// Latest diagnostic result for one patient.
///
/// The store keeps one row per `patient_id`; every analysis overwrites it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientRecord {
    /// Caller-supplied identifier (primary key)
    pub patient_id: String,
    /// Patient name, used as an identity cross-check
    pub name: String,
    /// Age in years
    pub age: u32,
    /// Most recent classifier label
    pub last_prediction: DiagnosticLabel,
    /// Classifier confidence as a percentage (0-100)
    pub confidence: f64,
    /// Number of follicles detected on the most recent scan
    pub follicle_count: u32,
    /// RFC 3339 timestamp of the last write
    pub last_update: String,
}

impl PatientRecord {
    /// Create a record stamped with the current time.
    pub fn new(
        patient_id: String,
        name: String,
        age: u32,
        last_prediction: DiagnosticLabel,
        confidence: f64,
        follicle_count: u32,
    ) -> Self {
        Self {
            patient_id,
            name,
            age,
            last_prediction,
            confidence,
            follicle_count,
            last_update: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Touch the last_update timestamp.
    pub fn touch(&mut self) {
        self.last_update = chrono::Utc::now().to_rfc3339();
    }
}
