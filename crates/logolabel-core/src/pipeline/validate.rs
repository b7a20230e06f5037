//! Cheap pre-decode checks on raw image files.

use std::io::Read;
use std::path::Path;

use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Rejects missing, oversized, or obviously non-image files before decode.
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    /// Create a new validator with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Check existence, size limit and magic bytes.
    pub fn validate(&self, path: &Path) -> Result<(), PipelineError> {
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }

        let metadata = std::fs::metadata(path).map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot read metadata: {}", e),
        })?;

        let max_bytes = self.limits.max_file_size_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            return Err(PipelineError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        self.check_magic_bytes(path)
    }

    fn check_magic_bytes(&self, path: &Path) -> Result<(), PipelineError> {
        let mut file = std::fs::File::open(path).map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot open file: {}", e),
        })?;

        let mut header = [0u8; 4];
        let bytes_read = file.read(&mut header).unwrap_or(0);

        if bytes_read < 2 {
            return Err(PipelineError::Decode {
                path: path.to_path_buf(),
                message: "File too small to be a valid image".to_string(),
            });
        }

        if !Self::is_valid_image_header(&header, bytes_read) {
            return Err(PipelineError::Decode {
                path: path.to_path_buf(),
                message: "Unrecognized image format (invalid magic bytes)".to_string(),
            });
        }

        Ok(())
    }

    /// JPEG, PNG and BMP signatures, the formats the labeler accepts.
    fn is_valid_image_header(header: &[u8; 4], bytes_read: usize) -> bool {
        // BMP: BM
        if header[0] == b'B' && header[1] == b'M' {
            return true;
        }
        if bytes_read < 3 {
            return false;
        }

        // JPEG: FF D8 FF
        if header[..3] == [0xFF, 0xD8, 0xFF] {
            return true;
        }

        // PNG: 89 50 4E 47
        bytes_read >= 4 && header == &[0x89, b'P', b'N', b'G']
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_bytes_jpeg() {
        assert!(Validator::is_valid_image_header(&[0xFF, 0xD8, 0xFF, 0xE0], 4));
    }

    #[test]
    fn test_magic_bytes_png() {
        assert!(Validator::is_valid_image_header(&[0x89, b'P', b'N', b'G'], 4));
    }

    #[test]
    fn test_magic_bytes_bmp() {
        assert!(Validator::is_valid_image_header(&[b'B', b'M', 0, 0], 2));
    }

    #[test]
    fn test_magic_bytes_invalid() {
        assert!(!Validator::is_valid_image_header(&[0, 0, 0, 0], 4));
        // WebP/GIF are valid images but not labeler inputs
        assert!(!Validator::is_valid_image_header(b"RIFF", 4));
        assert!(!Validator::is_valid_image_header(b"GIF8", 4));
    }

    #[test]
    fn test_validate_missing_file() {
        let validator = Validator::new(LimitsConfig::default());
        let err = validator
            .validate(Path::new("/definitely/not/here.jpg"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::FileNotFound(_)));
    }

    #[test]
    fn test_validate_text_file_renamed_to_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, b"hello world").unwrap();

        let err = Validator::new(LimitsConfig::default())
            .validate(&path)
            .unwrap_err();
        assert!(err.to_string().contains("magic bytes"));
    }
}
