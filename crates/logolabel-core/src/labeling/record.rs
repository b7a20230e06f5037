//! Normalized label records and per-image label files.
//!
//! One line per accepted detection in YOLO format:
//! `class cx cy w h`, all geometry as fractions of the image size with six
//! decimals. An image with no detections gets an empty file.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::types::BoundingBox;

/// The dataset is single-class: every record is the target logo.
pub const LOGO_CLASS_ID: u32 = 0;

/// Extension of label files.
const LABEL_EXTENSION: &str = "txt";

/// One accepted detection in normalized center/size form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabelRecord {
    pub class_id: u32,
    pub center_x: f64,
    pub center_y: f64,
    pub width: f64,
    pub height: f64,
}

impl LabelRecord {
    /// Normalize a pixel box against the *original* image dimensions.
    pub fn from_bbox(bbox: &BoundingBox, image_width: u32, image_height: u32) -> Self {
        let (x1, y1, x2, y2) = (
            bbox.x1 as f64,
            bbox.y1 as f64,
            bbox.x2 as f64,
            bbox.y2 as f64,
        );
        let (w, h) = (image_width as f64, image_height as f64);
        Self {
            class_id: LOGO_CLASS_ID,
            center_x: (x1 + x2) / 2.0 / w,
            center_y: (y1 + y2) / 2.0 / h,
            width: (x2 - x1) / w,
            height: (y2 - y1) / h,
        }
    }

    /// Map back to pixel coordinates.
    pub fn to_bbox(&self, image_width: u32, image_height: u32) -> BoundingBox {
        let (w, h) = (image_width as f64, image_height as f64);
        BoundingBox::new(
            ((self.center_x - self.width / 2.0) * w) as f32,
            ((self.center_y - self.height / 2.0) * h) as f32,
            ((self.center_x + self.width / 2.0) * w) as f32,
            ((self.center_y + self.height / 2.0) * h) as f32,
        )
    }

    /// Parse one label line. Returns `None` for malformed lines.
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let class_id = fields.next()?.parse().ok()?;
        let mut next = || fields.next()?.parse::<f64>().ok();
        let record = Self {
            class_id,
            center_x: next()?,
            center_y: next()?,
            width: next()?,
            height: next()?,
        };
        fields.next().is_none().then_some(record)
    }
}

impl fmt::Display for LabelRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:.6} {:.6} {:.6} {:.6}",
            self.class_id, self.center_x, self.center_y, self.width, self.height
        )
    }
}

/// `{labels_dir}/{image stem}.txt`
pub fn label_path(labels_dir: &Path, image_path: &Path) -> PathBuf {
    // Append rather than `with_extension`, which would eat dotted stems.
    let mut file_name = image_path
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_default();
    file_name.push(".");
    file_name.push(LABEL_EXTENSION);
    labels_dir.join(file_name)
}

/// Render records as newline-joined lines (empty string for no records).
pub fn render(records: &[LabelRecord]) -> String {
    records
        .iter()
        .map(LabelRecord::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Create or overwrite a label file.
pub fn write_label_file(path: &Path, records: &[LabelRecord]) -> std::io::Result<()> {
    std::fs::write(path, render(records))
}

/// Delete a label file; a file that is already gone is not an error.
pub fn remove_label_file(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Read a label file, skipping blank and malformed lines.
pub fn read_label_file(path: &Path) -> std::io::Result<Vec<LabelRecord>> {
    let content = std::fs::read_to_string(path)?;
    let mut records = Vec::new();
    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        match LabelRecord::parse(line) {
            Some(record) => records.push(record),
            None => tracing::warn!("Skipping malformed label line in {:?}: {:?}", path, line),
        }
    }
    Ok(records)
}
