//! Core data types shared across the labeling pipeline.

use serde::{Deserialize, Serialize};

use crate::config::PromptsConfig;
use crate::math::max_or_zero;

/// Axis-aligned box in pixel coordinates of the original image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Build from center/size form (the detector's native output).
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Clip the box to `[0, width] × [0, height]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    /// Intersection over union with another box.
    pub fn iou(&self, other: &Self) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// A region proposed by the candidate detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub bbox: BoundingBox,
    /// Detector confidence in [0, 1]
    pub confidence: f32,
    /// Detector class index; informational only, the matcher decides the label
    pub class_id: usize,
}

/// Positive and negative descriptions of the target logo.
///
/// Order matters: match scores are reported positionally against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    positive: Vec<String>,
    negative: Vec<String>,
}

impl PromptSet {
    pub fn new(positive: Vec<String>, negative: Vec<String>) -> Self {
        Self { positive, negative }
    }

    pub fn positive(&self) -> &[String] {
        &self.positive
    }

    pub fn negative(&self) -> &[String] {
        &self.negative
    }

    pub fn len(&self) -> usize {
        self.positive.len() + self.negative.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All prompts, positive first then negative.
    pub fn all(&self) -> impl Iterator<Item = &String> {
        self.positive.iter().chain(self.negative.iter())
    }
}

impl From<&PromptsConfig> for PromptSet {
    fn from(config: &PromptsConfig) -> Self {
        Self::new(config.positive.clone(), config.negative.clone())
    }
}

/// Joint probability distribution of one patch over every prompt.
///
/// Positive and negative entries come from a single softmax, so they compete
/// for the same probability mass.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchScores {
    pub positive: Vec<f32>,
    pub negative: Vec<f32>,
}

impl MatchScores {
    /// Split a joint distribution (positive prompts first) at `positive_len`.
    pub fn from_joint(mut probs: Vec<f32>, positive_len: usize) -> Self {
        let negative = probs.split_off(positive_len.min(probs.len()));
        Self {
            positive: probs,
            negative,
        }
    }

    pub fn max_positive(&self) -> f32 {
        max_or_zero(&self.positive)
    }

    pub fn max_negative(&self) -> f32 {
        max_or_zero(&self.negative)
    }
}
