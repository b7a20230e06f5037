//! Per-image labeling: propose, crop, match, accept, write.
//!
//! ```text
//! Image → Detector → [Candidate] → crop → Matcher → Policy → [LabelRecord] → {stem}.txt
//! ```
//!
//! Every processed image gets exactly one label file, empty when nothing was
//! accepted. Geometry is always normalized against the original image, never
//! the crop.

pub mod crop;
pub mod policy;
pub mod record;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use image::DynamicImage;
use serde::Serialize;

use crate::config::Config;
use crate::detection::{CandidateDetector, YoloDetector};
use crate::error::PipelineError;
use crate::matching::{ClipMatcher, SemanticMatcher};
use crate::pipeline::{ImageDecoder, Validator};
use crate::types::{Candidate, PromptSet};

pub use policy::AcceptancePolicy;
pub use record::{label_path, remove_label_file, LabelRecord};

/// Outcome of labeling one image.
#[derive(Debug, Clone, Serialize)]
pub struct ImageLabels {
    pub image_path: PathBuf,
    pub label_path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Candidates proposed by the detector
    pub candidates: usize,
    /// Accepted detections written to the label file
    pub records: Vec<LabelRecord>,
}

impl ImageLabels {
    /// An image is successful iff it received at least one label record.
    pub fn is_successful(&self) -> bool {
        !self.records.is_empty()
    }
}

/// Lets a supervisor abandon a labeling task before it writes.
///
/// The task writes its label file while holding the lock, and `cancel`
/// removes any file already written under the same lock. Once `cancel`
/// returns, the image has no label file and never will.
#[derive(Debug, Clone, Default)]
pub struct WriteGuard {
    cancelled: Arc<Mutex<bool>>,
}

impl WriteGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop any later write and delete `label_path` if it was already written.
    pub fn cancel(&self, label_path: &Path) -> std::io::Result<()> {
        let mut cancelled = self.cancelled.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        remove_label_file(label_path)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write `records` unless cancelled. Returns whether the file was written.
    fn write(&self, label_path: &Path, records: &[LabelRecord]) -> std::io::Result<bool> {
        let cancelled = self.cancelled.lock().unwrap_or_else(|e| e.into_inner());
        if *cancelled {
            return Ok(false);
        }
        record::write_label_file(label_path, records)?;
        Ok(true)
    }
}

/// Orchestrates the two-stage labeling of single images.
///
/// Models are loaded once and shared read-only, so one engine can label
/// many images concurrently.
pub struct LabelingEngine {
    detector: Arc<dyn CandidateDetector>,
    matcher: Arc<dyn SemanticMatcher>,
    prompts: PromptSet,
    policy: AcceptancePolicy,
    validator: Validator,
    decoder: ImageDecoder,
}

impl LabelingEngine {
    /// Assemble an engine from already-loaded models.
    pub fn new(
        detector: Arc<dyn CandidateDetector>,
        matcher: Arc<dyn SemanticMatcher>,
        prompts: PromptSet,
        policy: AcceptancePolicy,
        config: &Config,
    ) -> Self {
        Self {
            detector,
            matcher,
            prompts,
            policy,
            validator: Validator::new(config.limits.clone()),
            decoder: ImageDecoder::new(config.limits.clone()),
        }
    }

    /// Load the ONNX detector and CLIP matcher named by `config`.
    pub fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let model_dir = config.model_dir();
        let prompts = PromptSet::from(&config.prompts);

        let detector = YoloDetector::load(&config.detector, &model_dir)?;
        let matcher = ClipMatcher::load(&config.matcher, &model_dir)?;
        matcher.warm_up(&prompts)?;

        Ok(Self::new(
            Arc::new(detector),
            Arc::new(matcher),
            prompts,
            AcceptancePolicy::from(&config.matcher),
            config,
        ))
    }

    pub fn prompts(&self) -> &PromptSet {
        &self.prompts
    }

    pub fn policy(&self) -> &AcceptancePolicy {
        &self.policy
    }

    /// Label one image file and write `{labels_dir}/{stem}.txt`.
    ///
    /// On any error the image is left without a label file, so a stale
    /// file from an earlier run cannot make it count as labeled.
    pub fn label_image(
        &self,
        path: &Path,
        labels_dir: &Path,
    ) -> Result<ImageLabels, PipelineError> {
        self.label_image_guarded(path, labels_dir, &WriteGuard::new())
    }

    /// [`label_image`](Self::label_image), skipping the write once `guard` is cancelled.
    pub fn label_image_guarded(
        &self,
        path: &Path,
        labels_dir: &Path,
        guard: &WriteGuard,
    ) -> Result<ImageLabels, PipelineError> {
        let label_path = label_path(labels_dir, path);
        let result = self.label_and_write(path, label_path.clone(), guard);

        if result.is_err() {
            if let Err(e) = remove_label_file(&label_path) {
                tracing::warn!("Could not remove stale label file {:?}: {}", label_path, e);
            }
        }
        result
    }

    fn label_and_write(
        &self,
        path: &Path,
        label_path: PathBuf,
        guard: &WriteGuard,
    ) -> Result<ImageLabels, PipelineError> {
        let start = Instant::now();
        tracing::debug!("Labeling: {:?}", path);

        self.validator.validate(path)?;
        let decoded = self.decoder.decode(path)?;

        let candidates = self.detector.propose(&decoded.image, path)?;
        let records = self.label_candidates(&decoded.image, &candidates, path)?;

        let written = guard
            .write(&label_path, &records)
            .map_err(|source| PipelineError::LabelWrite {
                path: label_path.clone(),
                source,
            })?;
        if !written {
            return Err(PipelineError::Cancelled {
                path: path.to_path_buf(),
            });
        }

        tracing::debug!(
            "Labeled {:?} in {:?}: {}/{} candidate(s) accepted",
            path,
            start.elapsed(),
            records.len(),
            candidates.len()
        );

        Ok(ImageLabels {
            image_path: path.to_path_buf(),
            label_path,
            width: decoded.width,
            height: decoded.height,
            candidates: candidates.len(),
            records,
        })
    }

    /// Score every candidate and convert the accepted ones to label records.
    ///
    /// Zero-area crops are dropped before the matcher is called.
    pub fn label_candidates(
        &self,
        image: &DynamicImage,
        candidates: &[Candidate],
        path: &Path,
    ) -> Result<Vec<LabelRecord>, PipelineError> {
        let (width, height) = (image.width(), image.height());
        let mut records = Vec::new();

        for candidate in candidates {
            let Some(patch) = crop::crop(image, &candidate.bbox) else {
                tracing::trace!("Discarding zero-area candidate {:?}", candidate.bbox);
                continue;
            };

            let scores = self.matcher.classify(&patch, &self.prompts, path)?;
            let accepted = self.policy.accepts(&scores);
            tracing::debug!(
                "  candidate {:?} (det {:.2}): pos {:.3} neg {:.3} -> {}",
                candidate.bbox,
                candidate.confidence,
                scores.max_positive(),
                scores.max_negative(),
                if accepted { "accept" } else { "reject" }
            );

            if accepted {
                records.push(LabelRecord::from_bbox(&candidate.bbox, width, height));
            }
        }

        Ok(records)
    }
}
