//! YOLOv8 ONNX session management and output decoding.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use image::{DynamicImage, GenericImageView};
use ort::session::Session;
use ort::value::Value;

use crate::config::DetectorConfig;
use crate::error::PipelineError;
use crate::types::{BoundingBox, Candidate};

use super::nms::non_max_suppression;
use super::preprocess::preprocess;
use super::CandidateDetector;

/// The detector ONNX model filename.
const DETECTOR_MODEL_FILENAME: &str = "model.onnx";

/// Number of box coordinates preceding the class scores in each anchor row.
const BOX_COORDS: usize = 4;

/// Region proposer backed by a YOLOv8 ONNX export.
///
/// Uses a `Mutex` because `Session::run` requires `&mut self`.
pub struct YoloDetector {
    session: Mutex<Session>,
    input_name: String,
    config: DetectorConfig,
}

impl YoloDetector {
    /// Load the detector from `{model_dir}/{model}/model.onnx`.
    pub fn load(config: &DetectorConfig, model_dir: &Path) -> Result<Self, PipelineError> {
        let model_path = Self::model_path(config, model_dir);
        if !model_path.exists() {
            return Err(PipelineError::Model {
                message: format!(
                    "Detector model not found at {:?}. Export {} to ONNX and place it there.",
                    model_path, config.model
                ),
            });
        }

        tracing::info!("Loading detector from {:?}", model_path);
        let session = Session::builder()
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to create ONNX session builder: {e}"),
            })?
            .commit_from_file(&model_path)
            .map_err(|e| PipelineError::Model {
                message: format!("Failed to load detector model: {e}"),
            })?;

        let input_name = session
            .inputs()
            .first()
            .map(|i| i.name().to_string())
            .unwrap_or_else(|| "images".to_string());
        tracing::debug!("Detector loaded (input: {:?})", input_name);

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            config: config.clone(),
        })
    }

    /// Check whether the model file exists on disk.
    pub fn model_exists(config: &DetectorConfig, model_dir: &Path) -> bool {
        Self::model_path(config, model_dir).exists()
    }

    /// Get the expected model file path.
    pub fn model_path(config: &DetectorConfig, model_dir: &Path) -> PathBuf {
        model_dir.join(&config.model).join(DETECTOR_MODEL_FILENAME)
    }

    fn run(&self, image: &DynamicImage, path: &Path) -> Result<(Vec<usize>, Vec<f32>), PipelineError> {
        let detection_error = |message: String| PipelineError::Detection {
            path: path.to_path_buf(),
            message,
        };

        let tensor = preprocess(image, self.config.input_size);
        let shape: Vec<i64> = tensor.shape().iter().map(|&d| d as i64).collect();
        let flat_data: Vec<f32> = tensor.iter().copied().collect();
        let input_value = Value::from_array((shape, flat_data))
            .map_err(|e| detection_error(format!("Failed to create input tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| detection_error(format!("Session lock poisoned: {e}")))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(|e| detection_error(format!("ONNX inference failed: {e}")))?;

        let (_, output) = outputs
            .iter()
            .next()
            .ok_or_else(|| detection_error("Model produced no outputs".to_string()))?;
        let (shape, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| detection_error(format!("Failed to extract output tensor: {e}")))?;

        Ok((shape.iter().map(|&d| d as usize).collect(), data.to_vec()))
    }
}

impl CandidateDetector for YoloDetector {
    fn propose(&self, image: &DynamicImage, path: &Path) -> Result<Vec<Candidate>, PipelineError> {
        let (shape, data) = self.run(image, path)?;
        let (width, height) = image.dimensions();
        let raw = decode_output(&shape, &data, &self.config, width, height).map_err(|message| {
            PipelineError::Detection {
                path: path.to_path_buf(),
                message,
            }
        })?;
        let kept = non_max_suppression(raw, self.config.iou_threshold, self.config.max_detections);
        tracing::debug!("{:?}: {} candidate(s)", path, kept.len());
        Ok(kept)
    }
}

/// Decode a `[1, 4 + classes, anchors]` YOLOv8 output into candidates.
///
/// Each anchor column holds `cx, cy, w, h` in input-pixel units followed by
/// per-class scores; the best class score is the candidate's confidence.
/// Boxes are rescaled to the original image and clipped to its bounds.
pub(crate) fn decode_output(
    shape: &[usize],
    data: &[f32],
    config: &DetectorConfig,
    width: u32,
    height: u32,
) -> Result<Vec<Candidate>, String> {
    let (rows, anchors) = match shape {
        [1, rows, anchors] | [rows, anchors] => (*rows, *anchors),
        _ => return Err(format!("Unexpected detector output shape: {shape:?}")),
    };
    if rows <= BOX_COORDS || data.len() < rows * anchors {
        return Err(format!("Detector output too small for shape {shape:?}"));
    }

    let sx = width as f32 / config.input_size as f32;
    let sy = height as f32 / config.input_size as f32;
    let at = |row: usize, col: usize| data[row * anchors + col];

    let mut candidates = Vec::new();
    for col in 0..anchors {
        let (class_id, confidence) = (BOX_COORDS..rows)
            .map(|row| (row - BOX_COORDS, at(row, col)))
            .fold((0, f32::NEG_INFINITY), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            });
        if confidence < config.confidence_threshold {
            continue;
        }

        let bbox = BoundingBox::from_center(
            at(0, col) * sx,
            at(1, col) * sy,
            at(2, col) * sx,
            at(3, col) * sy,
        )
        .clamp_to(width, height);

        candidates.push(Candidate {
            bbox,
            confidence,
            class_id,
        });
    }
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a `[1, 4 + classes, anchors]` buffer from per-anchor rows.
    fn output(anchors: &[[f32; 6]]) -> (Vec<usize>, Vec<f32>) {
        let rows = 6;
        let mut data = vec![0.0; rows * anchors.len()];
        for (col, anchor) in anchors.iter().enumerate() {
            for (row, &v) in anchor.iter().enumerate() {
                data[row * anchors.len() + col] = v;
            }
        }
        (vec![1, rows, anchors.len()], data)
    }

    fn config() -> DetectorConfig {
        DetectorConfig {
            input_size: 100,
            ..DetectorConfig::default()
        }
    }

    #[test]
    fn test_decode_rescales_to_original_image() {
        let (shape, data) = output(&[[50.0, 50.0, 20.0, 10.0, 0.9, 0.1]]);
        let cands = decode_output(&shape, &data, &config(), 200, 400).unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].bbox, BoundingBox::new(80.0, 180.0, 120.0, 220.0));
        assert_eq!(cands[0].class_id, 0);
        assert!((cands[0].confidence - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_decode_threshold_is_inclusive() {
        let (shape, data) = output(&[
            [50.0, 50.0, 10.0, 10.0, 0.5, 0.0],
            [20.0, 20.0, 10.0, 10.0, 0.0, 0.49],
        ]);
        let cands = decode_output(&shape, &data, &config(), 100, 100).unwrap();
        assert_eq!(cands.len(), 1);
        assert_eq!(cands[0].confidence, 0.5);
    }

    #[test]
    fn test_decode_picks_best_class() {
        let (shape, data) = output(&[[50.0, 50.0, 10.0, 10.0, 0.55, 0.8]]);
        let cands = decode_output(&shape, &data, &config(), 100, 100).unwrap();
        assert_eq!(cands[0].class_id, 1);
    }

    #[test]
    fn test_decode_clips_to_image() {
        let (shape, data) = output(&[[5.0, 95.0, 20.0, 20.0, 0.9, 0.0]]);
        let cands = decode_output(&shape, &data, &config(), 100, 100).unwrap();
        assert_eq!(cands[0].bbox, BoundingBox::new(0.0, 85.0, 15.0, 100.0));
    }

    #[test]
    fn test_decode_rejects_bad_shape() {
        assert!(decode_output(&[1, 2, 3, 4], &[], &config(), 10, 10).is_err());
        assert!(decode_output(&[1, 4, 10], &[0.0; 40], &config(), 10, 10).is_err());
    }
}
