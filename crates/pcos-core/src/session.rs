//! Diagnostic session flow.
//!
//! Pipeline: Validation → Identity Guard → Decode + Scratch → Detector →
//! Classifier → Upsert → Comparison
//!
//! Nothing is written unless every earlier step succeeded. The store re-checks
//! the identity invariant inside its write transaction, so a conflicting write
//! that slipped in between the guard and the upsert is still rejected.

use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::{Database, DbError};
use crate::identity::{check_identity, IdentityConflict};
use crate::inference::{check_score, ClassifierInput, InferenceError, Models, ScanImage};
use crate::models::{
    confidence_percent, AnalysisOutcome, AnalysisRequest, Comparison, DiagnosticLabel,
    ImageUpload, PatientRecord,
};
use crate::validation::{validate_request, validate_upload, ValidationError};

/// Session errors.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Identity conflict: {0}")]
    IdentityConflict(#[from] IdentityConflict),

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Database error: {0}")]
    Database(DbError),
}

impl From<DbError> for SessionError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::IdentityConflict(conflict) => SessionError::IdentityConflict(conflict),
            other => SessionError::Database(other),
        }
    }
}

impl SessionError {
    /// Whether the user can fix this by editing and re-submitting the form.
    pub fn is_blocking_warning(&self) -> bool {
        matches!(
            self,
            SessionError::Validation(_) | SessionError::IdentityConflict(_)
        )
    }
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Map a classifier score to its label and percentage confidence.
pub fn interpret_score(score: f32) -> (DiagnosticLabel, f64) {
    (DiagnosticLabel::from_score(score), confidence_percent(score))
}

/// Runs analyses against one store with one set of loaded models.
///
/// Holding `&mut Database` makes each analysis a single serialized
/// read-decide-write sequence.
pub struct DiagnosticSession<'a> {
    db: &'a mut Database,
    models: &'a Models,
    scratch_dir: Option<&'a Path>,
}

impl<'a> DiagnosticSession<'a> {
    /// Create a new session.
    pub fn new(db: &'a mut Database, models: &'a Models) -> Self {
        Self {
            db,
            models,
            scratch_dir: None,
        }
    }

    /// Write decoded scans under `dir` instead of the system temp directory.
    pub fn with_scratch_dir(mut self, dir: &'a Path) -> Self {
        self.scratch_dir = Some(dir);
        self
    }

    /// Analyze one scan for one patient and store the result.
    pub fn analyze(
        &mut self,
        request: &AnalysisRequest,
        upload: &ImageUpload,
    ) -> SessionResult<AnalysisOutcome> {
        let analysis_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!(
            "analysis",
            analysis_id = %analysis_id,
            patient_id = %request.patient_id.trim()
        );
        let _enter = span.enter();

        if let Err(e) = validate_request(request).and_then(|_| validate_upload(upload)) {
            warn!(error = %e, "submission rejected");
            return Err(e.into());
        }

        let patient_id = request.patient_id.trim();
        let name = request.name.trim();

        let prior = self.db.get_record(patient_id)?;
        if let Err(conflict) = check_identity(prior.as_ref(), name) {
            warn!(stored_name = %conflict.stored_name, "blocked: name does not match record on file");
            return Err(conflict.into());
        }

        let image_sha256 = hex::encode(Sha256::digest(&upload.bytes));
        let scan = ScanImage::decode(&upload.bytes, self.scratch_dir)?;
        let (width, height) = scan.dimensions();
        debug!(width, height, scratch = %scan.path().display(), sha256 = %image_sha256, "decoded scan");

        let detection = self.models.detector.detect(&scan)?;
        let follicle_count = detection.count();
        debug!(follicle_count, "detector finished");

        let input = ClassifierInput::from_image(scan.pixels(), self.models.classifier.input_size());
        let score = check_score(self.models.classifier.score(&input)?)?;
        let (label, confidence) = interpret_score(score);
        debug!(score, %label, "classifier finished");

        drop(scan);

        // Validation guarantees 18..=45.
        let age = request.age as u32;
        let record = PatientRecord::new(
            patient_id.to_string(),
            name.to_string(),
            age,
            label,
            confidence,
            follicle_count,
        );
        let stored = self.db.upsert_record(&record)?;

        let comparison = prior
            .as_ref()
            .map(|previous| Comparison::between(previous.last_prediction, label));

        info!(
            follicle_count,
            %label,
            confidence,
            comparison = ?comparison,
            "analysis stored"
        );

        Ok(AnalysisOutcome {
            analysis_id,
            follicle_count,
            label,
            confidence,
            record: stored,
            prior,
            comparison,
            image_sha256,
            annotated: detection.annotated,
        })
    }
}
