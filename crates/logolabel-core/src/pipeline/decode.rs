//! Image decoding with content-based format detection and dimension limits.

use image::{DynamicImage, GenericImageView, ImageFormat};
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Image decoder with configurable limits.
pub struct ImageDecoder {
    limits: LimitsConfig,
}

/// Result of decoding an image.
pub struct DecodedImage {
    /// The decoded image data
    pub image: DynamicImage,
    /// Detected image format
    pub format: ImageFormat,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Read and decode an image file.
    ///
    /// Format is detected from content first, falling back to the extension,
    /// so a PNG saved as `.jpg` still decodes.
    pub fn decode(&self, path: &Path) -> Result<DecodedImage, PipelineError> {
        let bytes = std::fs::read(path).map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot read file: {}", e),
        })?;
        let decoded = Self::decode_bytes(bytes, path)?;

        if decoded.width > self.limits.max_image_dimension
            || decoded.height > self.limits.max_image_dimension
        {
            return Err(PipelineError::ImageTooLarge {
                path: path.to_path_buf(),
                width: decoded.width,
                height: decoded.height,
                max_dim: self.limits.max_image_dimension,
            });
        }
        Ok(decoded)
    }

    fn decode_bytes(bytes: Vec<u8>, path: &Path) -> Result<DecodedImage, PipelineError> {
        use std::io::Cursor;

        let reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| PipelineError::Decode {
                path: path.to_path_buf(),
                message: format!("Cannot detect image format: {}", e),
            })?;
        let format = match reader.format() {
            Some(f) => f,
            None => ImageFormat::from_path(path).map_err(|_| PipelineError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("unknown")
                    .to_string(),
            })?,
        };
        let image = reader.decode().map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let (width, height) = image.dimensions();
        Ok(DecodedImage {
            image,
            format,
            width,
            height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn test_format_detected_by_content() {
        let dir = tempfile::tempdir().unwrap();
        let misnamed = dir.path().join("test_misnamed.jpg");
        RgbImage::new(8, 6)
            .save_with_format(&misnamed, ImageFormat::Png)
            .unwrap();

        let decoded = ImageDecoder::new(LimitsConfig::default())
            .decode(&misnamed)
            .unwrap();
        assert_eq!(decoded.format, ImageFormat::Png);
        assert_eq!((decoded.width, decoded.height), (8, 6));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\n not really a png").unwrap();

        let err = ImageDecoder::new(LimitsConfig::default())
            .decode(&path)
            .err()
            .unwrap();
        assert!(matches!(err, PipelineError::Decode { .. }));
    }

    #[test]
    fn test_decode_rejects_oversized_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.png");
        RgbImage::new(40, 10).save(&path).unwrap();

        let limits = LimitsConfig {
            max_image_dimension: 32,
            ..LimitsConfig::default()
        };
        let err = ImageDecoder::new(limits).decode(&path).err().unwrap();
        assert!(matches!(err, PipelineError::ImageTooLarge { width: 40, .. }));
    }
}
