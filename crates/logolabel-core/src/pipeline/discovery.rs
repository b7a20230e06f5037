//! Raw image enumeration.
//!
//! Only the top level of the input directory is scanned. Anything below it
//! (for instance a `labels/` folder placed next to the images) is ignored.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::config::ProcessingConfig;

/// Finds supported images in the raw input directory.
pub struct FileDiscovery {
    /// Lowercased extensions without the leading dot
    extensions: HashSet<String>,
}

/// An image found by [`FileDiscovery`].
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

impl FileDiscovery {
    pub fn new(config: ProcessingConfig) -> Self {
        let extensions = config
            .supported_formats
            .iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        Self { extensions }
    }

    /// Images directly inside `input`, sorted by path.
    ///
    /// A single supported file is returned as-is. Sorting keeps labeling order
    /// and the train/val split reproducible across filesystems.
    pub fn discover(&self, input: &Path) -> Vec<DiscoveredFile> {
        let depth = if input.is_file() { 0 } else { 1 };

        let mut files: Vec<DiscoveredFile> = WalkDir::new(input)
            .min_depth(depth)
            .max_depth(depth)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry in {:?}: {}", input, e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && self.accepts(entry.path()))
            .filter_map(|entry| to_discovered(&entry))
            .collect();

        files.sort_unstable_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Case-insensitive extension check.
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
    }
}

fn to_discovered(entry: &DirEntry) -> Option<DiscoveredFile> {
    let size = entry.metadata().ok()?.len();
    Some(DiscoveredFile {
        path: entry.path().to_path_buf(),
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_matching() {
        let discovery = FileDiscovery::new(ProcessingConfig::default());

        for name in ["a.jpg", "a.JPG", "a.jpeg", "a.png", "a.Bmp"] {
            assert!(discovery.accepts(Path::new(name)), "{name}");
        }
        for name in ["a.webp", "a.txt", "noext", "jpg"] {
            assert!(!discovery.accepts(Path::new(name)), "{name}");
        }
    }

    #[test]
    fn test_dotted_format_config() {
        let discovery = FileDiscovery::new(ProcessingConfig {
            supported_formats: vec![".PNG".to_string()],
            ..ProcessingConfig::default()
        });
        assert!(discovery.accepts(Path::new("x.png")));
        assert!(!discovery.accepts(Path::new("x.jpg")));
    }

    #[test]
    fn test_discover_sorted_and_non_recursive() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.png", "a.JPG", "b.bmp", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/d.jpg"), b"x").unwrap();

        let files = FileDiscovery::new(ProcessingConfig::default()).discover(dir.path());
        let names: Vec<String> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.JPG", "b.bmp", "c.png"]);
    }

    #[test]
    fn test_discover_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.jpeg");
        std::fs::write(&path, b"xyz").unwrap();

        let files = FileDiscovery::new(ProcessingConfig::default()).discover(&path);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].path, path);
        assert_eq!(files[0].size, 3);
    }

    #[test]
    fn test_discover_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = FileDiscovery::new(ProcessingConfig::default()).discover(&dir.path().join("gone"));
        assert!(files.is_empty());
    }
}
