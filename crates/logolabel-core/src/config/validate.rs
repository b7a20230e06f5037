//! Configuration validation with range checks.

use std::collections::HashSet;

use crate::error::ConfigError;

use super::Config;

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

fn check_unit_interval(value: f32, name: &str) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ValidationError(format!(
            "{name} must be between 0.0 and 1.0"
        )));
    }
    Ok(())
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processing.parallel_workers == 0 {
            return Err(invalid("processing.parallel_workers must be > 0"));
        }
        if self.limits.max_file_size_mb == 0 {
            return Err(invalid("limits.max_file_size_mb must be > 0"));
        }
        if self.limits.max_image_dimension == 0 {
            return Err(invalid("limits.max_image_dimension must be > 0"));
        }
        if self.limits.image_timeout_ms == 0 {
            return Err(invalid("limits.image_timeout_ms must be > 0"));
        }
        if self.detector.input_size == 0 {
            return Err(invalid("detector.input_size must be > 0"));
        }
        if self.detector.max_detections == 0 {
            return Err(invalid("detector.max_detections must be > 0"));
        }
        check_unit_interval(
            self.detector.confidence_threshold,
            "detector.confidence_threshold",
        )?;
        check_unit_interval(self.detector.iou_threshold, "detector.iou_threshold")?;
        if self.matcher.image_size == 0 {
            return Err(invalid("matcher.image_size must be > 0"));
        }
        if self.matcher.logit_scale <= 0.0 {
            return Err(invalid("matcher.logit_scale must be > 0"));
        }
        check_unit_interval(
            self.matcher.positive_threshold,
            "matcher.positive_threshold",
        )?;
        check_unit_interval(
            self.matcher.negative_threshold,
            "matcher.negative_threshold",
        )?;
        if !(self.dataset.val_fraction > 0.0 && self.dataset.val_fraction < 1.0) {
            return Err(invalid("dataset.val_fraction must be in (0.0, 1.0)"));
        }
        if self.prompts.positive.is_empty() {
            return Err(invalid("prompts.positive must not be empty"));
        }
        if self.prompts.negative.is_empty() {
            return Err(invalid("prompts.negative must not be empty"));
        }
        let positive: HashSet<&str> = self.prompts.positive.iter().map(String::as_str).collect();
        if let Some(shared) = self
            .prompts
            .negative
            .iter()
            .find(|p| positive.contains(p.as_str()))
        {
            return Err(ConfigError::ValidationError(format!(
                "prompt {shared:?} appears in both prompts.positive and prompts.negative"
            )));
        }
        Ok(())
    }
}
