//! Candidate region proposal.
//!
//! The first stage of the labeling pipeline: a general-purpose object
//! detector proposes regions that *might* contain the logo. The detector's
//! own class labels are ignored; the semantic matcher decides.
//!
//! # Usage
//!
//! ```rust,ignore
//! use logolabel_core::detection::{CandidateDetector, YoloDetector};
//!
//! let config = Config::default();
//! let detector = YoloDetector::load(&config.detector, &config.model_dir())?;
//! let candidates = detector.propose(&image, path)?;
//! ```

mod nms;
pub(crate) mod preprocess;
mod yolo;

use std::path::Path;

use image::DynamicImage;

use crate::error::PipelineError;
use crate::types::Candidate;

pub use nms::non_max_suppression;
pub use yolo::YoloDetector;

/// Proposes candidate regions in a decoded image.
///
/// Implementations must only return candidates whose confidence is at or
/// above their configured threshold, with boxes in original pixel
/// coordinates.
pub trait CandidateDetector: Send + Sync {
    fn propose(&self, image: &DynamicImage, path: &Path) -> Result<Vec<Candidate>, PipelineError>;
}
