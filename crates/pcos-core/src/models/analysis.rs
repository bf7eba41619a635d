//! Analysis request and outcome models.

use image::RgbImage;
use serde::{Deserialize, Serialize};

use super::record::{DiagnosticLabel, PatientRecord};

/// Identity and demographics submitted with a scan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRequest {
    pub patient_id: String,
    pub name: String,
    pub age: i64,
}

impl AnalysisRequest {
    pub fn new(patient_id: impl Into<String>, name: impl Into<String>, age: i64) -> Self {
        Self {
            patient_id: patient_id.into(),
            name: name.into(),
            age,
        }
    }
}

/// An uploaded image file, still encoded.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    /// Original file name; its extension selects the accepted formats
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }
}

/// How a new label relates to the patient's previous one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    /// Same label as the previous analysis
    Consistent,
    /// Label differs from the previous analysis
    Changed,
}

impl Comparison {
    /// Compare a new label against the prior one.
    pub fn between(previous: DiagnosticLabel, current: DiagnosticLabel) -> Self {
        if previous == current {
            Comparison::Consistent
        } else {
            Comparison::Changed
        }
    }

    /// Human-readable summary shown next to the result.
    pub fn message(&self) -> &'static str {
        match self {
            Comparison::Consistent => "Diagnosis is consistent with the previous analysis.",
            Comparison::Changed => {
                "Diagnosis has changed since the previous analysis. Follow-up is recommended."
            }
        }
    }
}

/// Result of one completed analysis.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    /// Unique id of this analysis (log correlation)
    pub analysis_id: String,
    pub follicle_count: u32,
    pub label: DiagnosticLabel,
    /// Percentage, 0-100
    pub confidence: f64,
    /// The row as written to the store
    pub record: PatientRecord,
    /// The row that was replaced, if any
    pub prior: Option<PatientRecord>,
    /// Present only when a prior record existed
    pub comparison: Option<Comparison>,
    /// SHA-256 of the uploaded bytes
    pub image_sha256: String,
    /// Scan with detections drawn on it, when the detector provides one
    #[serde(skip)]
    pub annotated: Option<RgbImage>,
}

impl AnalysisOutcome {
    /// Serialize to JSON (annotated image omitted).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
