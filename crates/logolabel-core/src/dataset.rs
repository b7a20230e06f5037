//! Train/validation partitioning of labeled images.
//!
//! The split is a seeded shuffle: the same input list, fraction and seed
//! always yield the same manifests. Only images that received at least one
//! label record are partitioned; unlabeled images are not used as
//! background samples.

use std::path::{Path, PathBuf};

use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Serialize;

use crate::config::DatasetConfig;
use crate::error::SplitError;
use crate::labeling::record::{label_path, read_label_file};

/// Training manifest filename.
pub const TRAIN_MANIFEST: &str = "train.txt";

/// Validation manifest filename.
pub const VAL_MANIFEST: &str = "val.txt";

/// Result of a train/val split.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSplit {
    pub train: Vec<PathBuf>,
    pub val: Vec<PathBuf>,
}

/// Splits image lists and persists `train.txt` / `val.txt`.
#[derive(Debug, Clone)]
pub struct DatasetPartitioner {
    val_fraction: f64,
    seed: u64,
}

impl DatasetPartitioner {
    /// Create a partitioner; `val_fraction` must lie in the open interval (0, 1).
    pub fn new(val_fraction: f64, seed: u64) -> Result<Self, SplitError> {
        if !(val_fraction > 0.0 && val_fraction < 1.0) {
            return Err(SplitError::InvalidFraction(val_fraction));
        }
        Ok(Self { val_fraction, seed })
    }

    pub fn from_config(config: &DatasetConfig) -> Result<Self, SplitError> {
        Self::new(config.val_fraction, config.seed)
    }

    /// Number of validation images for `n` inputs.
    ///
    /// `ceil(fraction × n)`, capped at `n - 1` so training is never empty.
    pub fn val_len(&self, n: usize) -> usize {
        let raw = (self.val_fraction * n as f64).ceil() as usize;
        raw.min(n.saturating_sub(1))
    }

    /// Shuffle with the seeded RNG; the first `val_len` paths become validation.
    ///
    /// Order within each half is the post-shuffle order.
    pub fn partition(&self, image_paths: &[PathBuf]) -> Result<DatasetSplit, SplitError> {
        if image_paths.is_empty() {
            return Err(SplitError::Empty);
        }

        let mut shuffled = image_paths.to_vec();
        let mut rng = rand::rngs::StdRng::seed_from_u64(self.seed);
        shuffled.shuffle(&mut rng);

        let train = shuffled.split_off(self.val_len(shuffled.len()));
        Ok(DatasetSplit {
            train,
            val: shuffled,
        })
    }

    /// Partition and write both manifests into `output_dir`, overwriting them.
    pub fn split(
        &self,
        image_paths: &[PathBuf],
        output_dir: &Path,
    ) -> Result<DatasetSplit, SplitError> {
        let split = self.partition(image_paths)?;

        std::fs::create_dir_all(output_dir).map_err(|source| SplitError::ManifestWrite {
            path: output_dir.to_path_buf(),
            source,
        })?;
        let train = manifest_content(&split.train)?;
        let val = manifest_content(&split.val)?;
        write_manifests(output_dir, &[(TRAIN_MANIFEST, train), (VAL_MANIFEST, val)])?;

        tracing::info!(
            "Split {} image(s): {} train, {} val -> {:?}",
            image_paths.len(),
            split.train.len(),
            split.val.len(),
            output_dir
        );
        Ok(split)
    }
}

/// One path per line; non-UTF-8 paths are rejected rather than mangled.
fn manifest_content(paths: &[PathBuf]) -> Result<String, SplitError> {
    let lines = paths
        .iter()
        .map(|p| p.to_str().ok_or_else(|| SplitError::NonUtf8Path(p.clone())))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(lines.join("\n"))
}

/// Stage every manifest as `<name>.tmp`, then rename them into place.
///
/// Nothing is renamed until all staged files are written, so a failed write
/// leaves the previous manifests untouched.
fn write_manifests(output_dir: &Path, manifests: &[(&str, String)]) -> Result<(), SplitError> {
    let staged: Vec<(PathBuf, PathBuf)> = manifests
        .iter()
        .map(|(name, _)| (output_dir.join(format!("{name}.tmp")), output_dir.join(name)))
        .collect();

    for ((tmp, _), (_, content)) in staged.iter().zip(manifests) {
        if let Err(source) = std::fs::write(tmp, content) {
            discard_staged(&staged);
            return Err(SplitError::ManifestWrite {
                path: tmp.clone(),
                source,
            });
        }
    }

    for (tmp, target) in &staged {
        std::fs::rename(tmp, target).map_err(|source| {
            discard_staged(&staged);
            SplitError::ManifestWrite {
                path: target.clone(),
                source,
            }
        })?;
    }
    Ok(())
}

fn discard_staged(staged: &[(PathBuf, PathBuf)]) {
    for (tmp, _) in staged {
        if tmp.is_file() {
            if let Err(e) = std::fs::remove_file(tmp) {
                tracing::warn!("Could not remove staged manifest {:?}: {}", tmp, e);
            }
        }
    }
}

/// Read a manifest back into paths, skipping blank lines.
pub fn read_manifest(path: &Path) -> std::io::Result<Vec<PathBuf>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(PathBuf::from)
        .collect())
}

/// Keep the images whose label file in `labels_dir` holds at least one record.
///
/// Lets a dataset be re-split from an earlier labeling run without invoking
/// the models again. Missing or unreadable label files count as unlabeled.
pub fn labeled_images(image_paths: &[PathBuf], labels_dir: &Path) -> Vec<PathBuf> {
    image_paths
        .iter()
        .filter(|image| {
            let path = label_path(labels_dir, image);
            match read_label_file(&path) {
                Ok(records) => !records.is_empty(),
                Err(e) => {
                    tracing::debug!("No usable label file {:?}: {}", path, e);
                    false
                }
            }
        })
        .cloned()
        .collect()
}
