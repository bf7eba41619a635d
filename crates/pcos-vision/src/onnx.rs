//! ONNX Runtime adapters.
//!
//! Each model gets one `Session`, built when the adapter is loaded and reused
//! for every scan until the process exits.

use std::path::Path;
use std::sync::Arc;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;

use pcos_core::config::{ClassifierConfig, DetectorConfig, PcosConfig};
use pcos_core::inference::{
    ClassifierInput, Detection, FollicleDetector, InferenceError, InferenceResult, Models,
    PcosClassifier, ScanImage,
};

use crate::annotate::draw_detections;
use crate::preprocess::letterbox;
use crate::yolo::decode_detections;

fn runtime(e: ort::Error) -> InferenceError {
    InferenceError::Runtime(e.to_string())
}

fn load_session(path: &Path) -> InferenceResult<Session> {
    Session::builder()
        .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
        .and_then(|b| b.commit_from_file(path))
        .map_err(|e| InferenceError::ModelLoad(format!("{}: {}", path.display(), e)))
}

/// YOLOv8 follicle detector.
pub struct OnnxDetector {
    session: Session,
    config: DetectorConfig,
}

impl OnnxDetector {
    pub fn load(config: &DetectorConfig) -> InferenceResult<Self> {
        let session = load_session(&config.model_path)?;
        tracing::info!(model = %config.model_path.display(), "loaded follicle detector");
        Ok(Self {
            session,
            config: config.clone(),
        })
    }
}

impl FollicleDetector for OnnxDetector {
    fn detect(&self, scan: &ScanImage) -> InferenceResult<Detection> {
        let input = letterbox(scan.pixels(), self.config.input_size);
        let tensor = Tensor::from_array((input.shape(), input.tensor.clone())).map_err(runtime)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor].map_err(runtime)?)
            .map_err(runtime)?;
        let (shape, data) = outputs[0].try_extract_raw_tensor::<f32>().map_err(runtime)?;
        let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        let boxes = decode_detections(data, &shape, &self.config, &input)?;
        let annotated = draw_detections(scan.pixels(), &boxes);
        Ok(Detection {
            boxes,
            annotated: Some(annotated),
        })
    }
}

/// Binary PCOS image classifier.
pub struct OnnxClassifier {
    session: Session,
    input_size: u32,
}

impl OnnxClassifier {
    pub fn load(config: &ClassifierConfig) -> InferenceResult<Self> {
        let session = load_session(&config.model_path)?;
        tracing::info!(model = %config.model_path.display(), "loaded PCOS classifier");
        Ok(Self {
            session,
            input_size: config.input_size,
        })
    }
}

impl PcosClassifier for OnnxClassifier {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn score(&self, input: &ClassifierInput) -> InferenceResult<f32> {
        let tensor = Tensor::from_array((input.shape(), input.data.clone())).map_err(runtime)?;

        let outputs = self
            .session
            .run(ort::inputs![tensor].map_err(runtime)?)
            .map_err(runtime)?;
        let (_, data) = outputs[0].try_extract_raw_tensor::<f32>().map_err(runtime)?;

        // Sigmoid head: one value. Softmax head: [negative, positive].
        match data {
            [score] => Ok(*score),
            [_, positive] => Ok(*positive),
            other => Err(InferenceError::InvalidOutput(format!(
                "classifier returned {} values, expected 1 or 2",
                other.len()
            ))),
        }
    }
}

/// Load both models named in the configuration.
pub fn load_models(config: &PcosConfig) -> InferenceResult<Models> {
    let detector = OnnxDetector::load(&config.detector)?;
    let classifier = OnnxClassifier::load(&config.classifier)?;
    Ok(Models::new(Arc::new(detector), Arc::new(classifier)))
}
