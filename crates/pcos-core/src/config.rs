//! Application configuration.
//!
//! Loaded from a TOML file; every key has a default so an empty file (or no
//! file at all) yields a working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PcosConfig {
    /// SQLite file holding patient records
    pub database_path: PathBuf,
    /// Directory for decoded scans handed to path-based runtimes
    pub scratch_dir: Option<PathBuf>,
    pub detector: DetectorConfig,
    pub classifier: ClassifierConfig,
    pub logging: LoggingConfig,
}

impl Default for PcosConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("pcos_records.db"),
            scratch_dir: None,
            detector: DetectorConfig::default(),
            classifier: ClassifierConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Follicle detector (YOLO-style ONNX model) settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    /// Square input side in pixels
    pub input_size: u32,
    /// Class score rows in the head, after the four box rows
    pub num_classes: usize,
    /// Minimum box confidence kept
    pub confidence_threshold: f32,
    /// Overlap above which the weaker box is suppressed
    pub iou_threshold: f32,
    pub max_detections: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/follicle_yolov8n.onnx"),
            input_size: 640,
            num_classes: 1,
            confidence_threshold: 0.1,
            iou_threshold: 0.45,
            max_detections: 300,
        }
    }
}

/// PCOS classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClassifierConfig {
    pub model_path: PathBuf,
    /// Square input side in pixels
    pub input_size: u32,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/pcos_classifier.onnx"),
            input_size: 224,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing filter when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl PcosConfig {
    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: PcosConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from a file when it exists, otherwise use defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            tracing::info!(
                path = %path.as_ref().display(),
                "config file not found, using defaults"
            );
            Ok(Self::default())
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.detector.confidence_threshold) {
            return Err(ConfigError::Invalid(format!(
                "detector.confidence_threshold {} must be within [0, 1]",
                self.detector.confidence_threshold
            )));
        }
        if !unit.contains(&self.detector.iou_threshold) {
            return Err(ConfigError::Invalid(format!(
                "detector.iou_threshold {} must be within [0, 1]",
                self.detector.iou_threshold
            )));
        }
        if self.detector.input_size == 0 || self.classifier.input_size == 0 {
            return Err(ConfigError::Invalid("input_size must be positive".into()));
        }
        if self.detector.num_classes == 0 {
            return Err(ConfigError::Invalid(
                "detector.num_classes must be positive".into(),
            ));
        }
        if self.detector.max_detections == 0 {
            return Err(ConfigError::Invalid(
                "detector.max_detections must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = PcosConfig::from_toml_str("").unwrap();
        assert_eq!(config, PcosConfig::default());
        assert_eq!(config.detector.confidence_threshold, 0.1);
        assert_eq!(config.detector.iou_threshold, 0.45);
    }

    #[test]
    fn test_partial_override() {
        let config = PcosConfig::from_toml_str(
            r#"
            database_path = "/var/lib/pcos/records.db"

            [classifier]
            input_size = 256
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/var/lib/pcos/records.db"));
        assert_eq!(config.classifier.input_size, 256);
        assert_eq!(config.classifier.model_path, ClassifierConfig::default().model_path);
        assert_eq!(config.detector, DetectorConfig::default());
    }

    #[test]
    fn test_invalid_threshold_rejected() {
        let result = PcosConfig::from_toml_str("[detector]\niou_threshold = 1.5\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_zero_classes_rejected() {
        let result = PcosConfig::from_toml_str("[detector]\nnum_classes = 0\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
        assert_eq!(DetectorConfig::default().num_classes, 1);
    }

    #[test]
    fn test_parse_error() {
        let result = PcosConfig::from_toml_str("database_path = [");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PcosConfig::load_or_default(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, PcosConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pcos.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let config = PcosConfig::load(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
    }
}
