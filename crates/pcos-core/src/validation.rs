//! Input validation for analysis submissions.

use std::ops::RangeInclusive;

use thiserror::Error;

use crate::models::{AnalysisRequest, ImageUpload};

/// Ages accepted for screening.
pub const AGE_RANGE: RangeInclusive<i64> = 18..=45;

/// Image file extensions accepted for upload.
pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Validation errors. All of them are raised before any side effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("age {age} is outside the supported range {min}-{max}")]
    AgeOutOfRange { age: i64, min: i64, max: i64 },

    #[error("unsupported image type {0:?}; expected jpg, jpeg or png")]
    UnsupportedImageType(String),

    #[error("uploaded image is empty")]
    EmptyImage,
}

/// Validate the identity fields and age of a request.
pub fn validate_request(request: &AnalysisRequest) -> Result<(), ValidationError> {
    if request.patient_id.trim().is_empty() {
        return Err(ValidationError::MissingField("patient_id"));
    }
    if request.name.trim().is_empty() {
        return Err(ValidationError::MissingField("name"));
    }
    if !AGE_RANGE.contains(&request.age) {
        return Err(ValidationError::AgeOutOfRange {
            age: request.age,
            min: *AGE_RANGE.start(),
            max: *AGE_RANGE.end(),
        });
    }
    Ok(())
}

/// Validate the upload's file type and that it carries data.
pub fn validate_upload(upload: &ImageUpload) -> Result<(), ValidationError> {
    let ext = upload.extension().unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(ValidationError::UnsupportedImageType(upload.file_name.clone()));
    }
    if upload.bytes.is_empty() {
        return Err(ValidationError::EmptyImage);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_request() {
        assert!(validate_request(&AnalysisRequest::new("P001", "Jane Doe", 30)).is_ok());
    }

    #[test]
    fn test_blank_fields() {
        assert_eq!(
            validate_request(&AnalysisRequest::new("  ", "Jane", 30)),
            Err(ValidationError::MissingField("patient_id"))
        );
        assert_eq!(
            validate_request(&AnalysisRequest::new("P001", "", 30)),
            Err(ValidationError::MissingField("name"))
        );
    }

    #[test]
    fn test_age_bounds_inclusive() {
        assert!(validate_request(&AnalysisRequest::new("P1", "A", 18)).is_ok());
        assert!(validate_request(&AnalysisRequest::new("P1", "A", 45)).is_ok());
        assert!(matches!(
            validate_request(&AnalysisRequest::new("P1", "A", 17)),
            Err(ValidationError::AgeOutOfRange { age: 17, .. })
        ));
        assert!(matches!(
            validate_request(&AnalysisRequest::new("P1", "A", 46)),
            Err(ValidationError::AgeOutOfRange { age: 46, .. })
        ));
    }

    #[test]
    fn test_upload_types() {
        assert!(validate_upload(&ImageUpload::new("scan.PNG", vec![1])).is_ok());
        assert!(validate_upload(&ImageUpload::new("scan.jpeg", vec![1])).is_ok());
        assert!(matches!(
            validate_upload(&ImageUpload::new("scan.bmp", vec![1])),
            Err(ValidationError::UnsupportedImageType(_))
        ));
        assert_eq!(
            validate_upload(&ImageUpload::new("scan.jpg", vec![])),
            Err(ValidationError::EmptyImage)
        );
    }
}
