//! Semantic matching of candidate patches against the prompt set.
//!
//! The second stage of the labeling pipeline: a CLIP dual encoder embeds the
//! cropped patch and every prompt, and a single softmax over the scaled
//! cosine similarities yields a distribution across *all* prompts. Positive
//! and negative prompts therefore compete for the same probability mass.
//!
//! Expected model layout under `{model_dir}/{matcher.model}/`:
//! `visual.onnx`, `text_model.onnx`, `tokenizer.json`.

pub(crate) mod preprocess;
mod text;
mod visual;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use image::DynamicImage;

use crate::config::MatcherConfig;
use crate::error::PipelineError;
use crate::math::{dot, softmax};
use crate::types::{MatchScores, PromptSet};

pub use text::ClipTextEncoder;
pub use visual::ClipVisualEncoder;

/// The visual encoder ONNX model filename.
const VISUAL_MODEL_FILENAME: &str = "visual.onnx";

/// Scores a patch against a prompt set.
pub trait SemanticMatcher: Send + Sync {
    /// Return the joint distribution over `prompts`, split into positive and
    /// negative subvectors aligned with the prompt order.
    fn classify(
        &self,
        patch: &DynamicImage,
        prompts: &PromptSet,
        path: &Path,
    ) -> Result<MatchScores, PipelineError>;
}

/// CLIP-backed matcher. Loaded once and shared across all images.
pub struct ClipMatcher {
    visual: ClipVisualEncoder,
    text: ClipTextEncoder,
    image_size: u32,
    logit_scale: f32,
    /// Prompt embeddings, encoded on first use and reused for every patch.
    text_cache: RwLock<HashMap<String, Vec<f32>>>,
}

impl ClipMatcher {
    /// Load both CLIP towers from `{model_dir}/{config.model}/`.
    pub fn load(config: &MatcherConfig, model_dir: &Path) -> Result<Self, PipelineError> {
        let dir = model_dir.join(&config.model);
        let visual_path = dir.join(VISUAL_MODEL_FILENAME);
        if !visual_path.exists() {
            return Err(PipelineError::Model {
                message: format!("Visual encoder not found at {:?}", visual_path),
            });
        }

        tracing::info!("Loading CLIP matcher from {:?}", dir);
        let visual = ClipVisualEncoder::load(&visual_path)?;
        let text = ClipTextEncoder::new(&dir)?;
        tracing::info!("CLIP matcher loaded successfully");

        Ok(Self {
            visual,
            text,
            image_size: config.image_size,
            logit_scale: config.logit_scale,
            text_cache: RwLock::new(HashMap::new()),
        })
    }

    /// Check whether all matcher model files exist on disk.
    pub fn model_exists(config: &MatcherConfig, model_dir: &Path) -> bool {
        let dir = Self::model_dir(config, model_dir);
        dir.join(VISUAL_MODEL_FILENAME).exists() && ClipTextEncoder::model_exists(&dir)
    }

    /// Get the expected model directory.
    pub fn model_dir(config: &MatcherConfig, model_dir: &Path) -> PathBuf {
        model_dir.join(&config.model)
    }

    /// Encode every prompt up front so the first image doesn't pay for it.
    pub fn warm_up(&self, prompts: &PromptSet) -> Result<(), PipelineError> {
        self.prompt_embeddings(prompts).map(|_| ())
    }

    /// Embeddings for every prompt in order, encoding any not yet cached.
    fn prompt_embeddings(&self, prompts: &PromptSet) -> Result<Vec<Vec<f32>>, PipelineError> {
        let missing: Vec<String> = {
            let cache = self.read_cache()?;
            prompts
                .all()
                .filter(|p| !cache.contains_key(*p))
                .cloned()
                .collect()
        };

        if !missing.is_empty() {
            tracing::debug!("Encoding {} prompt(s)", missing.len());
            let embeddings = self.text.encode_batch(&missing)?;
            let mut cache = self.text_cache.write().map_err(|e| PipelineError::Model {
                message: format!("Prompt cache lock poisoned: {e}"),
            })?;
            cache.extend(missing.into_iter().zip(embeddings));
        }

        let cache = self.read_cache()?;
        prompts
            .all()
            .map(|p| {
                cache.get(p).cloned().ok_or_else(|| PipelineError::Model {
                    message: format!("No embedding produced for prompt {p:?}"),
                })
            })
            .collect()
    }

    fn read_cache(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Vec<f32>>>, PipelineError> {
        self.text_cache.read().map_err(|e| PipelineError::Model {
            message: format!("Prompt cache lock poisoned: {e}"),
        })
    }
}

impl SemanticMatcher for ClipMatcher {
    fn classify(
        &self,
        patch: &DynamicImage,
        prompts: &PromptSet,
        path: &Path,
    ) -> Result<MatchScores, PipelineError> {
        let text_embeddings = self.prompt_embeddings(prompts)?;
        let tensor = preprocess::preprocess(patch, self.image_size);
        let image_embedding = self.visual.embed(&tensor, path)?;
        Ok(joint_scores(
            &image_embedding,
            &text_embeddings,
            self.logit_scale,
            prompts.positive().len(),
        ))
    }
}

/// Softmax over `logit_scale × cosine` for every prompt, split at `positive_len`.
///
/// All embeddings are L2-normalized, so the dot product is the cosine.
pub fn joint_scores(
    image_embedding: &[f32],
    text_embeddings: &[Vec<f32>],
    logit_scale: f32,
    positive_len: usize,
) -> MatchScores {
    let logits: Vec<f32> = text_embeddings
        .iter()
        .map(|t| logit_scale * dot(image_embedding, t))
        .collect();
    MatchScores::from_joint(softmax(&logits), positive_len)
}
