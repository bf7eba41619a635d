//! PCOS Scan Assistant Core Library
//!
//! Local-first ultrasound screening: follicle counting, PCOS classification and
//! a per-patient record of the latest result.
//!
//! # Architecture
//!
//! ```text
//! Form (id, name, age) + Ultrasound image
//!                 │
//!            Validation ──────────────► ValidationError (no side effects)
//!                 │
//!          Identity Guard ────────────► IdentityConflict (no inference, no write)
//!                 │
//!     Decode → scratch PNG (ScanImage)
//!                 │
//!        ┌────────┴─────────┐
//!        ▼                  ▼
//!  FollicleDetector    PcosClassifier
//!   (box count)      (score → label, %)
//!        └────────┬─────────┘
//!                 │
//!     ┌───────────▼────────────┐
//!     │  Record Store upsert   │
//!     │  (identity re-checked  │
//!     │   in one transaction)  │
//!     └───────────┬────────────┘
//!                 │
//!     Comparison with prior record
//!     (consistent / changed)
//! ```
//!
//! # Core Principle
//!
//! **A patient id never changes hands.** A submission whose name disagrees with
//! the stored record is blocked before any model runs.
//!
//! # Modules
//!
//! - [`db`]: SQLite record store (one row per patient)
//! - [`models`]: Domain types (PatientRecord, DiagnosticLabel, AnalysisOutcome)
//! - [`identity`]: Identity guard
//! - [`validation`]: Form and upload validation
//! - [`inference`]: Detector / classifier contracts and image preparation
//! - [`session`]: The diagnostic session flow
//! - [`config`]: TOML configuration

pub mod config;
pub mod db;
pub mod identity;
pub mod inference;
pub mod models;
pub mod session;
pub mod validation;

// Re-export commonly used types
pub use config::PcosConfig;
pub use db::Database;
pub use identity::{check_identity, IdentityConflict};
pub use inference::{
    BoundingBox, ClassifierInput, Detection, FollicleDetector, InferenceError, Models,
    PcosClassifier, ScanImage,
};
pub use models::{
    AnalysisOutcome, AnalysisRequest, Comparison, DiagnosticLabel, ImageUpload, PatientRecord,
};
pub use session::{DiagnosticSession, SessionError};
pub use validation::ValidationError;

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use inference::InferenceResult;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum PcosError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Patient id {patient_id} is already registered to {stored_name}")]
    IdentityConflict {
        patient_id: String,
        stored_name: String,
    },

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<SessionError> for PcosError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Validation(v) => PcosError::InvalidInput(v.to_string()),
            SessionError::IdentityConflict(c) => PcosError::IdentityConflict {
                patient_id: c.patient_id,
                stored_name: c.stored_name,
            },
            SessionError::Inference(i) => PcosError::InferenceError(i.to_string()),
            SessionError::Database(d) => PcosError::DatabaseError(d.to_string()),
        }
    }
}

impl From<db::DbError> for PcosError {
    fn from(e: db::DbError) -> Self {
        SessionError::from(e).into()
    }
}

impl From<serde_json::Error> for PcosError {
    fn from(e: serde_json::Error) -> Self {
        PcosError::SerializationError(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for PcosError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        PcosError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for PcosError {
    fn from(e: uniffi::UnexpectedUniFFICallbackError) -> Self {
        PcosError::InferenceError(e.reason)
    }
}

// =========================================================================
// Foreign Model Interfaces
// =========================================================================

/// Follicle detector implemented by the host application.
#[uniffi::export(with_foreign)]
pub trait FfiFollicleDetector: Send + Sync {
    /// Detect follicles on the PNG at `image_path` (`width` x `height` pixels).
    fn detect(
        &self,
        image_path: String,
        width: u32,
        height: u32,
    ) -> Result<Vec<FfiBoundingBox>, PcosError>;
}

/// PCOS classifier implemented by the host application.
#[uniffi::export(with_foreign)]
pub trait FfiPcosClassifier: Send + Sync {
    /// Side length of the square input.
    fn input_size(&self) -> u32;

    /// Score an NHWC tensor `[1, size, size, 3]` with values in [0, 1].
    fn score(&self, input: Vec<f32>) -> Result<f32, PcosError>;
}

struct ForeignDetector(Arc<dyn FfiFollicleDetector>);

impl FollicleDetector for ForeignDetector {
    fn detect(&self, scan: &ScanImage) -> InferenceResult<Detection> {
        let (width, height) = scan.dimensions();
        let boxes = self
            .0
            .detect(scan.path().to_string_lossy().into_owned(), width, height)
            .map_err(|e| InferenceError::Runtime(e.to_string()))?;
        Ok(Detection::new(boxes.into_iter().map(Into::into).collect()))
    }
}

struct ForeignClassifier(Arc<dyn FfiPcosClassifier>);

impl PcosClassifier for ForeignClassifier {
    fn input_size(&self) -> u32 {
        self.0.input_size()
    }

    fn score(&self, input: &ClassifierInput) -> InferenceResult<f32> {
        self.0
            .score(input.data.clone())
            .map_err(|e| InferenceError::Runtime(e.to_string()))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a record store at the given path with host-provided models.
#[uniffi::export]
pub fn open_core(
    path: String,
    detector: Arc<dyn FfiFollicleDetector>,
    classifier: Arc<dyn FfiPcosClassifier>,
    scratch_dir: Option<String>,
) -> Result<Arc<PcosCore>, PcosError> {
    let db = Database::open(&path)?;
    Ok(Arc::new(PcosCore::new(db, detector, classifier, scratch_dir)))
}

/// Create an in-memory record store (for testing).
#[uniffi::export]
pub fn open_core_in_memory(
    detector: Arc<dyn FfiFollicleDetector>,
    classifier: Arc<dyn FfiPcosClassifier>,
) -> Result<Arc<PcosCore>, PcosError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(PcosCore::new(db, detector, classifier, None)))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe store and model wrapper for FFI.
///
/// The mutex is the single write path: analyses for the same patient run one
/// after another.
#[derive(uniffi::Object)]
pub struct PcosCore {
    db: Arc<Mutex<Database>>,
    models: Models,
    scratch_dir: Option<PathBuf>,
}

impl PcosCore {
    fn new(
        db: Database,
        detector: Arc<dyn FfiFollicleDetector>,
        classifier: Arc<dyn FfiPcosClassifier>,
        scratch_dir: Option<String>,
    ) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            models: Models::new(
                Arc::new(ForeignDetector(detector)),
                Arc::new(ForeignClassifier(classifier)),
            ),
            scratch_dir: scratch_dir.map(PathBuf::from),
        }
    }
}

#[uniffi::export]
impl PcosCore {
    // =========================================================================
    // Analysis
    // =========================================================================

    /// Analyze an uploaded scan and store the result.
    pub fn analyze(
        &self,
        request: FfiAnalysisRequest,
        file_name: String,
        image: Vec<u8>,
    ) -> Result<FfiAnalysisOutcome, PcosError> {
        let mut db = self.db.lock()?;
        let mut session = DiagnosticSession::new(&mut db, &self.models);
        if let Some(dir) = &self.scratch_dir {
            session = session.with_scratch_dir(dir);
        }
        let outcome = session.analyze(&request.into(), &ImageUpload::new(file_name, image))?;
        Ok(outcome.into())
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Get the latest record for a patient.
    pub fn get_record(&self, patient_id: String) -> Result<Option<FfiPatientRecord>, PcosError> {
        let db = self.db.lock()?;
        let record = db.get_record(&patient_id)?;
        Ok(record.map(|r| r.into()))
    }

    /// List all records, most recent first.
    pub fn list_records(&self) -> Result<Vec<FfiPatientRecord>, PcosError> {
        let db = self.db.lock()?;
        let records = db.list_records()?;
        Ok(records.into_iter().map(|r| r.into()).collect())
    }

    /// Delete a patient's record.
    pub fn delete_record(&self, patient_id: String) -> Result<bool, PcosError> {
        let db = self.db.lock()?;
        Ok(db.delete_record(&patient_id)?)
    }

    /// Export all records as JSON.
    pub fn export_records_json(&self) -> Result<String, PcosError> {
        let db = self.db.lock()?;
        let records = db.list_records()?;
        Ok(serde_json::to_string_pretty(&records)?)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe analysis request.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAnalysisRequest {
    pub patient_id: String,
    pub name: String,
    pub age: i64,
}

impl From<FfiAnalysisRequest> for AnalysisRequest {
    fn from(req: FfiAnalysisRequest) -> Self {
        AnalysisRequest {
            patient_id: req.patient_id,
            name: req.name,
            age: req.age,
        }
    }
}

/// FFI-safe bounding box.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiBoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl From<FfiBoundingBox> for BoundingBox {
    fn from(b: FfiBoundingBox) -> Self {
        BoundingBox {
            x1: b.x1,
            y1: b.y1,
            x2: b.x2,
            y2: b.y2,
            confidence: b.confidence,
            class_id: b.class_id,
        }
    }
}

/// FFI-safe patient record.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiPatientRecord {
    pub patient_id: String,
    pub name: String,
    pub age: u32,
    pub last_prediction: String,
    pub confidence: f64,
    pub follicle_count: u32,
    pub last_update: String,
}

impl From<PatientRecord> for FfiPatientRecord {
    fn from(record: PatientRecord) -> Self {
        Self {
            patient_id: record.patient_id,
            name: record.name,
            age: record.age,
            last_prediction: record.last_prediction.as_str().to_string(),
            confidence: record.confidence,
            follicle_count: record.follicle_count,
            last_update: record.last_update,
        }
    }
}

/// FFI-safe analysis outcome.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiAnalysisOutcome {
    pub analysis_id: String,
    pub follicle_count: u32,
    pub label: String,
    pub confidence: f64,
    pub record: FfiPatientRecord,
    pub prior: Option<FfiPatientRecord>,
    /// "consistent" or "changed"; absent for a first analysis
    pub comparison: Option<String>,
    pub comparison_message: Option<String>,
    pub image_sha256: String,
}

impl From<AnalysisOutcome> for FfiAnalysisOutcome {
    fn from(outcome: AnalysisOutcome) -> Self {
        Self {
            analysis_id: outcome.analysis_id,
            follicle_count: outcome.follicle_count,
            label: outcome.label.as_str().to_string(),
            confidence: outcome.confidence,
            record: outcome.record.into(),
            prior: outcome.prior.map(|p| p.into()),
            comparison: outcome.comparison.map(|c| match c {
                Comparison::Consistent => "consistent".to_string(),
                Comparison::Changed => "changed".to_string(),
            }),
            comparison_message: outcome.comparison.map(|c| c.message().to_string()),
            image_sha256: outcome.image_sha256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};

    struct TwoBoxes;

    impl FfiFollicleDetector for TwoBoxes {
        fn detect(
            &self,
            image_path: String,
            width: u32,
            height: u32,
        ) -> Result<Vec<FfiBoundingBox>, PcosError> {
            assert!(std::path::Path::new(&image_path).exists());
            assert_eq!((width, height), (12, 10));
            let b = FfiBoundingBox {
                x1: 0.0,
                y1: 0.0,
                x2: 4.0,
                y2: 4.0,
                confidence: 0.8,
                class_id: 0,
            };
            Ok(vec![b.clone(), b])
        }
    }

    struct FixedScore(f32);

    impl FfiPcosClassifier for FixedScore {
        fn input_size(&self) -> u32 {
            8
        }

        fn score(&self, input: Vec<f32>) -> Result<f32, PcosError> {
            assert_eq!(input.len(), 8 * 8 * 3);
            Ok(self.0)
        }
    }

    fn png() -> Vec<u8> {
        let img = RgbImage::from_pixel(12, 10, Rgb([90, 90, 90]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn request(name: &str) -> FfiAnalysisRequest {
        FfiAnalysisRequest {
            patient_id: "P001".into(),
            name: name.into(),
            age: 30,
        }
    }

    #[test]
    fn test_ffi_analyze_roundtrip() {
        let core = open_core_in_memory(Arc::new(TwoBoxes), Arc::new(FixedScore(0.9))).unwrap();

        let outcome = core.analyze(request("Jane Doe"), "scan.png".into(), png()).unwrap();
        assert_eq!(outcome.follicle_count, 2);
        assert_eq!(outcome.label, "PCOS Detected");
        assert!(outcome.comparison.is_none());

        let record = core.get_record("P001".into()).unwrap().unwrap();
        assert_eq!(record.follicle_count, 2);
        assert_eq!(record.last_prediction, "PCOS Detected");

        let again = core.analyze(request("jane doe"), "scan.png".into(), png()).unwrap();
        assert_eq!(again.comparison.as_deref(), Some("consistent"));
    }

    #[test]
    fn test_ffi_identity_conflict() {
        let core = open_core_in_memory(Arc::new(TwoBoxes), Arc::new(FixedScore(0.2))).unwrap();
        core.analyze(request("Jane Doe"), "scan.png".into(), png()).unwrap();

        let err = core
            .analyze(request("John Smith"), "scan.png".into(), png())
            .unwrap_err();
        match err {
            PcosError::IdentityConflict { stored_name, .. } => assert_eq!(stored_name, "Jane Doe"),
            other => panic!("expected identity conflict, got {:?}", other),
        }
        assert_eq!(core.list_records().unwrap().len(), 1);
    }

    #[test]
    fn test_ffi_export_json() {
        let core = open_core_in_memory(Arc::new(TwoBoxes), Arc::new(FixedScore(0.2))).unwrap();
        core.analyze(request("Jane Doe"), "scan.png".into(), png()).unwrap();

        let json = core.export_records_json().unwrap();
        assert!(json.contains("No PCOS Detected"));
        assert!(core.delete_record("P001".into()).unwrap());
        assert_eq!(core.export_records_json().unwrap(), "[]");
    }
}
