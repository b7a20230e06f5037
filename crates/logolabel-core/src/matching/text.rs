//! CLIP text encoder for prompt embeddings.
//!
//! Loads the CLIP text ONNX model and tokenizer, encodes prompt strings to
//! vectors aligned with the visual encoder's space.

use std::path::Path;
use std::sync::Mutex;

use ort::session::Session;
use ort::value::Value;

use crate::error::PipelineError;

/// CLIP's context length.
const MAX_LENGTH: usize = 77;

/// CLIP pads with its end-of-text token.
const PAD_TOKEN: &str = "<|endoftext|>";

/// Output carrying the projected embedding in HF `CLIPTextModelWithProjection` exports.
const TEXT_EMBEDS_OUTPUT: &str = "text_embeds";

/// CLIP text encoder wrapper.
///
/// Uses the same `Mutex<Session>` pattern as the visual encoder.
pub struct ClipTextEncoder {
    session: Mutex<Session>,
    tokenizer: tokenizers::Tokenizer,
    pad_id: u32,
}

impl ClipTextEncoder {
    /// Load the text encoder from the model directory.
    ///
    /// Expects `text_model.onnx` and `tokenizer.json` in `model_dir`.
    pub fn new(model_dir: &Path) -> Result<Self, PipelineError> {
        let text_model_path = model_dir.join("text_model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        if !text_model_path.exists() {
            return Err(PipelineError::Model {
                message: format!("Text encoder not found at {:?}", text_model_path),
            });
        }

        if !tokenizer_path.exists() {
            return Err(PipelineError::Model {
                message: format!("Tokenizer not found at {:?}", tokenizer_path),
            });
        }

        let session = Session::builder()
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .commit_from_file(&text_model_path)
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to load text encoder model: {e}"),
            })?;

        let tokenizer = tokenizers::Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            PipelineError::Model {
                message: format!("Failed to load tokenizer: {e}"),
            }
        })?;
        let pad_id = tokenizer.token_to_id(PAD_TOKEN).unwrap_or(0);

        tracing::debug!(
            "Loaded CLIP text encoder (inputs: {:?}, outputs: {:?})",
            session
                .inputs()
                .iter()
                .map(|i| i.name())
                .collect::<Vec<_>>(),
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            pad_id,
        })
    }

    /// Encode a batch of prompts to normalized embeddings, one per input.
    pub fn encode_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let batch_size = texts.len();

        let encodings = self
            .tokenizer
            .encode_batch(texts.to_vec(), true)
            .map_err(|e| PipelineError::Model {
                message: format!("Tokenization failed: {e}"),
            })?;
        let ids: Vec<&[u32]> = encodings.iter().map(|e| e.get_ids()).collect();
        let (input_ids, attention_mask, seq_len) = pad_batch(&ids, self.pad_id);

        let mut session = self.session.lock().map_err(|e| PipelineError::Model {
            message: format!("Text encoder lock poisoned: {e}"),
        })?;

        let dims = vec![batch_size as i64, seq_len as i64];
        let input_ids_value =
            Value::from_array((dims.clone(), input_ids)).map_err(|e| PipelineError::Model {
                message: format!("Failed to create input_ids tensor: {e}"),
            })?;
        let attention_mask_value =
            Value::from_array((dims, attention_mask)).map_err(|e| PipelineError::Model {
                message: format!("Failed to create attention_mask tensor: {e}"),
            })?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_value,
                "attention_mask" => attention_mask_value
            ])
            .map_err(|e| PipelineError::Model {
                message: format!("Text encoder inference failed: {e}"),
            })?;

        let text_embeds = outputs
            .iter()
            .find(|(name, _)| *name == TEXT_EMBEDS_OUTPUT)
            .ok_or_else(|| PipelineError::Model {
                message: "Text encoder did not produce text_embeds".to_string(),
            })?;

        let (_shape, data) =
            text_embeds
                .1
                .try_extract_tensor::<f32>()
                .map_err(|e| PipelineError::Model {
                    message: format!("Failed to extract text_embeds: {e}"),
                })?;

        let embedding_dim = data.len() / batch_size;
        Ok(data
            .chunks(embedding_dim.max(1))
            .take(batch_size)
            .map(crate::math::l2_normalize)
            .collect())
    }

    /// Check whether the text encoder model files exist.
    pub fn model_exists(model_dir: &Path) -> bool {
        model_dir.join("text_model.onnx").exists() && model_dir.join("tokenizer.json").exists()
    }
}

/// Truncate to CLIP's context and pad to the longest sequence in the batch.
///
/// Returns flat `input_ids`, flat `attention_mask` and the padded length.
fn pad_batch(ids: &[&[u32]], pad_id: u32) -> (Vec<i64>, Vec<i64>, usize) {
    let seq_len = ids
        .iter()
        .map(|s| s.len().min(MAX_LENGTH))
        .max()
        .unwrap_or(0)
        .max(1);

    let mut input_ids = vec![pad_id as i64; ids.len() * seq_len];
    let mut attention_mask = vec![0i64; ids.len() * seq_len];
    for (i, seq) in ids.iter().enumerate() {
        for (j, &id) in seq.iter().take(seq_len).enumerate() {
            input_ids[i * seq_len + j] = id as i64;
            attention_mask[i * seq_len + j] = 1;
        }
    }
    (input_ids, attention_mask, seq_len)
}
