//! Sub-configuration structs with their defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where models are stored
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.logolabel/models"),
        }
    }
}

/// Processing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Number of images labeled concurrently
    pub parallel_workers: usize,

    /// Supported input formats (matched case-insensitively)
    pub supported_formats: Vec<String>,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            parallel_workers: 4,
            supported_formats: vec![
                "jpg".to_string(),
                "jpeg".to_string(),
                "png".to_string(),
                "bmp".to_string(),
            ],
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum image dimension (width or height)
    pub max_image_dimension: u32,

    /// Wall-clock budget for labeling one image, in milliseconds
    pub image_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_image_dimension: 10000,
            image_timeout_ms: 120_000,
        }
    }
}

/// Candidate detector (region proposer) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Model name; the ONNX file lives at `{model_dir}/{model}/model.onnx`
    pub model: String,

    /// Square input size the model was exported with
    pub input_size: u32,

    /// Candidates scoring below this are dropped
    pub confidence_threshold: f32,

    /// IoU above which overlapping same-class boxes are suppressed
    pub iou_threshold: f32,

    /// Maximum candidates returned per image
    pub max_detections: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: "yolov8m".to_string(),
            input_size: 640,
            confidence_threshold: 0.5,
            iou_threshold: 0.7,
            max_detections: 300,
        }
    }
}

/// Semantic matcher (image/text dual encoder) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatcherConfig {
    /// Model name; files live under `{model_dir}/{model}/`
    pub model: String,

    /// Square crop size fed to the visual encoder
    pub image_size: u32,

    /// Temperature applied to cosine similarities before the softmax.
    /// CLIP's learned value is exp(4.6052) = 100.
    pub logit_scale: f32,

    /// A candidate is accepted only if its best positive prompt exceeds this
    pub positive_threshold: f32,

    /// Negative-probability ceiling. Kept configurable but not consulted by
    /// the acceptance policy.
    pub negative_threshold: f32,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            model: "clip-vit-base-patch32".to_string(),
            image_size: 224,
            logit_scale: 100.0,
            positive_threshold: 0.7,
            negative_threshold: 0.3,
        }
    }
}

/// Curated descriptions of the target logo and its distractors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Descriptions of the target logo
    pub positive: Vec<String>,

    /// Descriptions of look-alikes and unrelated content
    pub negative: Vec<String>,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        let to_strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            positive: to_strings(&[
                "a black T on a yellow shield logo",
                "T-Bank logo",
                "a white T on a grey shield",
                "a black T on a white shield",
                "a black T on a silver shield",
                "a geometric T emblem",
                "stylized letter T in a shield",
            ]),
            negative: to_strings(&[
                "Tinkoff logo",
                "a red T on a circle",
                "text",
                "a person",
                "a car",
                "background",
                "object",
            ]),
        }
    }
}

/// Dataset layout and train/val partitioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    /// Directory of raw, unlabeled images
    pub raw_dir: PathBuf,

    /// Directory receiving one label file per image
    pub labels_dir: PathBuf,

    /// Dataset root receiving `train.txt` and `val.txt`
    pub root: PathBuf,

    /// Fraction of labeled images assigned to validation
    pub val_fraction: f64,

    /// Seed for the partition shuffle
    pub seed: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            raw_dir: PathBuf::from("data/input/raw"),
            labels_dir: PathBuf::from("data/input/labels"),
            root: PathBuf::from("data/input"),
            val_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
