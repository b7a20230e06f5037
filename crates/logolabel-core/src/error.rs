//! Error types for the logolabel pipeline.
//!
//! Errors are organized by stage so that per-image failures (which the batch
//! driver logs and skips) stay distinct from run-level failures (which abort
//! the whole job and surface to the caller).

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for logolabel operations.
#[derive(Error, Debug)]
pub enum LabelError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Train/val partitioning errors
    #[error("Split error: {0}")]
    Split(#[from] SplitError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No image in the run produced a single label record
    #[error("No images were labeled ({discovered} discovered, {failed} failed)")]
    NoImagesLabeled { discovered: usize, failed: usize },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Per-image pipeline errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Candidate detection failed
    #[error("Detection failed for {path}: {message}")]
    Detection { path: PathBuf, message: String },

    /// Prompt matching failed
    #[error("Matching failed for {path}: {message}")]
    Matching { path: PathBuf, message: String },

    /// Model loading or text encoding failed
    #[error("Model error: {message}")]
    Model { message: String },

    /// Writing the label file failed
    #[error("Failed to write label file {path}: {source}")]
    LabelWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Operation timed out
    #[error("Timeout in {stage} stage for {path} after {timeout_ms}ms")]
    Timeout {
        path: PathBuf,
        stage: String,
        timeout_ms: u64,
    },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Image dimensions exceed limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Unsupported image format
    #[error("Unsupported format for {path}: {format}")]
    UnsupportedFormat { path: PathBuf, format: String },

    /// The image was abandoned (e.g. after a timeout) before its label file was written
    #[error("Labeling cancelled for {path}")]
    Cancelled { path: PathBuf },

    /// Another image in the batch already owns this label file
    #[error("Label file {label_path} is already claimed by {claimed_by}")]
    DuplicateStem {
        label_path: PathBuf,
        claimed_by: PathBuf,
    },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Train/val partitioning errors.
#[derive(Error, Debug)]
pub enum SplitError {
    /// Validation fraction outside the open interval (0, 1)
    #[error("Validation fraction must be in (0, 1), got {0}")]
    InvalidFraction(f64),

    /// Nothing to split
    #[error("Cannot split an empty image list")]
    Empty,

    /// A manifest line cannot represent this path
    #[error("Manifest paths must be valid UTF-8: {0}")]
    NonUtf8Path(PathBuf),

    /// Writing a manifest failed
    #[error("Failed to write manifest {path}: {source}")]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience type alias for logolabel results.
pub type Result<T> = std::result::Result<T, LabelError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_images_labeled_message() {
        let err = LabelError::NoImagesLabeled {
            discovered: 12,
            failed: 3,
        };
        assert_eq!(
            err.to_string(),
            "No images were labeled (12 discovered, 3 failed)"
        );
    }

    #[test]
    fn test_pipeline_error_wraps_into_label_error() {
        let err: LabelError = PipelineError::FileNotFound(PathBuf::from("/x.jpg")).into();
        assert!(err.to_string().contains("/x.jpg"));
    }
}
