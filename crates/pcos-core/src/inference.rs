//! Inference adapter contracts.
//!
//! The follicle detector and the PCOS classifier are pretrained models run by
//! an external runtime. This module defines the boundary the session talks to:
//! a detector that turns a scan into bounding boxes and a classifier that turns
//! a normalized square tensor into a score in [0, 1].
//!
//! Models are loaded once by the host and handed to the session as a
//! [`Models`] bundle, so tests can substitute fakes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::imageops::FilterType;
use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Inference errors. Any of these aborts the analysis before the store is touched.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Image could not be decoded: {0}")]
    InvalidImage(String),

    #[error("Scratch storage error: {0}")]
    Scratch(#[from] std::io::Error),

    #[error("Model load error: {0}")]
    ModelLoad(String),

    #[error("Model runtime error: {0}")]
    Runtime(String),

    #[error("Invalid model output: {0}")]
    InvalidOutput(String),
}

pub type InferenceResult<T> = Result<T, InferenceError>;

/// An axis-aligned detection in source-image pixel coordinates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl BoundingBox {
    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// Detector output for one scan.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub boxes: Vec<BoundingBox>,
    /// Scan with the boxes drawn on it, if the detector renders one
    pub annotated: Option<RgbImage>,
}

impl Detection {
    pub fn new(boxes: Vec<BoundingBox>) -> Self {
        Self {
            boxes,
            annotated: None,
        }
    }

    /// Follicle count: one per detected box.
    pub fn count(&self) -> u32 {
        self.boxes.len() as u32
    }
}

/// A decoded scan, also written to scratch storage for path-based runtimes.
///
/// The scratch file is deleted when the scan is dropped.
#[derive(Debug)]
pub struct ScanImage {
    pixels: RgbImage,
    scratch: NamedTempFile,
}

impl ScanImage {
    /// Decode an encoded image to RGB and persist it as PNG in `scratch_dir`
    /// (the system temp directory when `None`).
    pub fn decode(bytes: &[u8], scratch_dir: Option<&Path>) -> InferenceResult<Self> {
        let pixels = image::load_from_memory(bytes)
            .map_err(|e| InferenceError::InvalidImage(e.to_string()))?
            .to_rgb8();
        Self::from_rgb(pixels, scratch_dir)
    }

    /// Wrap already-decoded pixels.
    pub fn from_rgb(pixels: RgbImage, scratch_dir: Option<&Path>) -> InferenceResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("pcos-scan-").suffix(".png");
        let scratch = match scratch_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        pixels
            .save_with_format(scratch.path(), ImageFormat::Png)
            .map_err(|e| InferenceError::InvalidImage(e.to_string()))?;

        Ok(Self { pixels, scratch })
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Path of the PNG copy in scratch storage.
    pub fn path(&self) -> &Path {
        self.scratch.path()
    }

    pub fn path_buf(&self) -> PathBuf {
        self.scratch.path().to_path_buf()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }
}

/// Classifier input: a `size x size` RGB image as NHWC floats in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierInput {
    pub size: u32,
    pub data: Vec<f32>,
}

impl ClassifierInput {
    /// Resize to the model's square input and scale pixels to [0, 1].
    pub fn from_image(image: &RgbImage, size: u32) -> Self {
        let resized = image::imageops::resize(image, size, size, FilterType::Triangle);
        let data = resized
            .as_raw()
            .iter()
            .map(|&v| f32::from(v) / 255.0)
            .collect();
        Self { size, data }
    }

    /// Tensor shape `[1, size, size, 3]`.
    pub fn shape(&self) -> [usize; 4] {
        [1, self.size as usize, self.size as usize, 3]
    }
}

/// Counts follicles on a scan.
pub trait FollicleDetector: Send + Sync {
    fn detect(&self, scan: &ScanImage) -> InferenceResult<Detection>;
}

/// Scores PCOS likelihood.
pub trait PcosClassifier: Send + Sync {
    /// Side length of the square input the model expects.
    fn input_size(&self) -> u32;

    /// Score in [0, 1].
    fn score(&self, input: &ClassifierInput) -> InferenceResult<f32>;
}

/// The two models, loaded once per process.
#[derive(Clone)]
pub struct Models {
    pub detector: Arc<dyn FollicleDetector>,
    pub classifier: Arc<dyn PcosClassifier>,
}

impl Models {
    pub fn new(detector: Arc<dyn FollicleDetector>, classifier: Arc<dyn PcosClassifier>) -> Self {
        Self {
            detector,
            classifier,
        }
    }
}

/// Reject scores that are not a probability.
pub fn check_score(score: f32) -> InferenceResult<f32> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(score)
    } else {
        Err(InferenceError::InvalidOutput(format!(
            "classifier score {} is outside [0, 1]",
            score
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn boxed(x1: f32, y1: f32, x2: f32, y2: f32) -> BoundingBox {
        BoundingBox {
            x1,
            y1,
            x2,
            y2,
            confidence: 0.9,
            class_id: 0,
        }
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, Rgb([10, 20, 30]));
        let mut out = std::io::Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn test_iou() {
        let a = boxed(0.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&boxed(20.0, 20.0, 30.0, 30.0)), 0.0);

        let half = boxed(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&half) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn test_degenerate_box_iou_is_zero() {
        let point = boxed(1.0, 1.0, 1.0, 1.0);
        assert_eq!(point.iou(&point), 0.0);
    }

    #[test]
    fn test_scan_decode_writes_scratch_png() {
        let dir = tempfile::tempdir().unwrap();
        let scan = ScanImage::decode(&png_bytes(8, 6), Some(dir.path())).unwrap();

        assert_eq!(scan.dimensions(), (8, 6));
        assert!(scan.path().starts_with(dir.path()));
        let reread = image::open(scan.path()).unwrap().to_rgb8();
        assert_eq!(reread.get_pixel(0, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn test_scratch_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let scan = ScanImage::decode(&png_bytes(4, 4), Some(dir.path())).unwrap();
        let path = scan.path_buf();
        assert!(path.exists());
        drop(scan);
        assert!(!path.exists());
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = ScanImage::decode(b"not an image", None);
        assert!(matches!(result, Err(InferenceError::InvalidImage(_))));
    }

    #[test]
    fn test_classifier_input_normalized() {
        let img = RgbImage::from_pixel(50, 30, Rgb([255, 0, 51]));
        let input = ClassifierInput::from_image(&img, 16);

        assert_eq!(input.shape(), [1, 16, 16, 3]);
        assert_eq!(input.data.len(), 16 * 16 * 3);
        assert!(input.data.iter().all(|v| (0.0..=1.0).contains(v)));
        assert!((input.data[0] - 1.0).abs() < 1e-6);
        assert_eq!(input.data[1], 0.0);
        assert!((input.data[2] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_check_score() {
        assert_eq!(check_score(0.0).unwrap(), 0.0);
        assert_eq!(check_score(1.0).unwrap(), 1.0);
        assert!(check_score(1.01).is_err());
        assert!(check_score(-0.1).is_err());
        assert!(check_score(f32::NAN).is_err());
    }
}
