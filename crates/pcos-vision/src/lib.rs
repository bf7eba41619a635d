//! Model adapters for follicle detection and PCOS classification.
//!
//! The pure parts (letterboxing, YOLO head decoding, NMS, box drawing) are
//! always built. The ONNX Runtime sessions live behind the `onnx` feature.

pub mod annotate;
pub mod preprocess;
pub mod yolo;

#[cfg(feature = "onnx")]
pub mod onnx;

pub use annotate::*;
pub use preprocess::*;
pub use yolo::*;

#[cfg(feature = "onnx")]
pub use onnx::*;
