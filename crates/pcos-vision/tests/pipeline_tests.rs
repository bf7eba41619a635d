//! Detector decoding wired through the diagnostic session.
//!
//! A canned YOLO head stands in for the ONNX runtime so the letterbox, decode,
//! NMS and annotation steps run exactly as they would behind a real model.

use std::sync::Arc;

use image::{ImageFormat, Rgb, RgbImage};

use pcos_core::config::DetectorConfig;
use pcos_core::db::Database;
use pcos_core::inference::{
    ClassifierInput, Detection, FollicleDetector, InferenceResult, Models, PcosClassifier,
    ScanImage,
};
use pcos_core::models::{AnalysisRequest, DiagnosticLabel, ImageUpload};
use pcos_core::session::DiagnosticSession;
use pcos_vision::{decode_detections, draw_detections, letterbox, BOX_COLOR};

/// Replays a fixed `[1, 5, n]` head in letterboxed coordinates.
struct CannedHead {
    config: DetectorConfig,
    anchors: Vec<(f32, f32, f32, f32, f32)>,
}

impl FollicleDetector for CannedHead {
    fn detect(&self, scan: &ScanImage) -> InferenceResult<Detection> {
        let input = letterbox(scan.pixels(), self.config.input_size);
        let n = self.anchors.len();
        let mut output = vec![0.0; 5 * n];
        for (i, a) in self.anchors.iter().enumerate() {
            output[i] = a.0;
            output[n + i] = a.1;
            output[2 * n + i] = a.2;
            output[3 * n + i] = a.3;
            output[4 * n + i] = a.4;
        }
        let boxes = decode_detections(&output, &[1, 5, n], &self.config, &input)?;
        let annotated = draw_detections(scan.pixels(), &boxes);
        Ok(Detection {
            boxes,
            annotated: Some(annotated),
        })
    }
}

struct Constant(f32);

impl PcosClassifier for Constant {
    fn input_size(&self) -> u32 {
        64
    }

    fn score(&self, _input: &ClassifierInput) -> InferenceResult<f32> {
        Ok(self.0)
    }
}

fn upload(width: u32, height: u32) -> ImageUpload {
    let img = RgbImage::from_pixel(width, height, Rgb([40, 40, 40]));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    ImageUpload::new("ultrasound.png", out.into_inner())
}

#[test]
fn test_follicle_count_from_decoded_head() {
    let config = DetectorConfig {
        input_size: 128,
        ..DetectorConfig::default()
    };
    let detector = CannedHead {
        config,
        anchors: vec![
            (20.0, 40.0, 10.0, 10.0, 0.85),
            (21.0, 40.0, 10.0, 10.0, 0.60), // duplicate of the first
            (80.0, 60.0, 12.0, 12.0, 0.40),
            (100.0, 90.0, 8.0, 8.0, 0.12),
            (60.0, 30.0, 8.0, 8.0, 0.03), // below threshold
        ],
    };
    let models = Models::new(Arc::new(detector), Arc::new(Constant(0.64)));
    let mut db = Database::open_in_memory().unwrap();

    let outcome = DiagnosticSession::new(&mut db, &models)
        .analyze(&AnalysisRequest::new("P100", "Rosa", 34), &upload(256, 128))
        .unwrap();

    assert_eq!(outcome.follicle_count, 3);
    assert_eq!(outcome.label, DiagnosticLabel::PcosDetected);
    assert_eq!(db.get_record("P100").unwrap().unwrap().follicle_count, 3);

    let annotated = outcome.annotated.expect("detector renders boxes");
    assert_eq!(annotated.dimensions(), (256, 128));
    assert!(annotated.pixels().any(|p| *p == BOX_COLOR));
}

#[test]
fn test_empty_head_counts_zero() {
    let detector = CannedHead {
        config: DetectorConfig {
            input_size: 64,
            ..DetectorConfig::default()
        },
        anchors: vec![(10.0, 10.0, 4.0, 4.0, 0.01)],
    };
    let models = Models::new(Arc::new(detector), Arc::new(Constant(0.2)));
    let mut db = Database::open_in_memory().unwrap();

    let outcome = DiagnosticSession::new(&mut db, &models)
        .analyze(&AnalysisRequest::new("P101", "Ines", 19), &upload(64, 64))
        .unwrap();

    assert_eq!(outcome.follicle_count, 0);
    assert_eq!(outcome.label, DiagnosticLabel::NoPcosDetected);
}
