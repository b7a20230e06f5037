//! CLIP visual encoder session management and inference.
//!
//! Loads a CLIP vision tower (with projection) exported to ONNX and turns a
//! preprocessed patch into an L2-normalized embedding in the joint
//! image/text space.

use std::path::Path;
use std::sync::Mutex;

use ndarray::Array4;
use ort::session::Session;
use ort::value::Value;

use crate::error::PipelineError;

/// Output carrying the projected embedding in HF `CLIPVisionModelWithProjection` exports.
const IMAGE_EMBEDS_OUTPUT: &str = "image_embeds";

/// Wraps an ONNX Runtime session for the CLIP visual encoder.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct ClipVisualEncoder {
    session: Mutex<Session>,
    /// Name of the input tensor (detected from model metadata).
    input_name: String,
}

impl ClipVisualEncoder {
    /// Load the visual encoder from an ONNX file.
    pub fn load(model_path: &Path) -> Result<Self, PipelineError> {
        let session = Session::builder()
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .commit_from_file(model_path)
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to load visual encoder {:?}: {e}", model_path),
            })?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "pixel_values".to_string());

        tracing::debug!(
            "Loaded CLIP visual encoder from {:?} (input: {:?}, outputs: {:?})",
            model_path,
            input_name,
            session
                .outputs()
                .iter()
                .map(|o| o.name())
                .collect::<Vec<_>>()
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
        })
    }

    /// Run inference on a preprocessed patch tensor and return its embedding.
    ///
    /// Input shape: \[1, 3, image_size, image_size\] (NCHW, CLIP-normalized).
    pub fn embed(&self, preprocessed: &Array4<f32>, path: &Path) -> Result<Vec<f32>, PipelineError> {
        let matching_error = |message: String| PipelineError::Matching {
            path: path.to_path_buf(),
            message,
        };

        let shape: Vec<i64> = preprocessed.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = preprocessed.iter().copied().collect();
        let input_value = Value::from_array((shape, flat_data))
            .map_err(|e| matching_error(format!("Failed to create input tensor: {e}")))?;

        let inputs = ort::inputs![self.input_name.as_str() => input_value];

        let mut session = self
            .session
            .lock()
            .map_err(|e| matching_error(format!("Session lock poisoned: {e}")))?;

        let outputs = session
            .run(inputs)
            .map_err(|e| matching_error(format!("ONNX inference failed: {e}")))?;

        // Prefer the projected embedding; single-output exports carry it first.
        let embeds = outputs
            .iter()
            .find(|(name, _)| *name == IMAGE_EMBEDS_OUTPUT)
            .or_else(|| outputs.iter().next())
            .ok_or_else(|| matching_error("Model produced no outputs".to_string()))?;

        let (shape, data) = embeds
            .1
            .try_extract_tensor::<f32>()
            .map_err(|e| matching_error(format!("Failed to extract image_embeds: {e}")))?;

        let mut raw = match shape.len() {
            1 => data.to_vec(),
            2 => {
                let dim = shape[1] as usize;
                data[..dim].to_vec()
            }
            _ => {
                return Err(matching_error(format!(
                    "Unexpected image_embeds shape: {:?}",
                    shape
                )));
            }
        };

        crate::math::l2_normalize_in_place(&mut raw);
        Ok(raw)
    }
}
