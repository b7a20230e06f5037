//! Directory-level driver: discover, label with a bounded worker pool, split.
//!
//! Per-image failures (undecodable files, model errors, timeouts) are logged
//! and counted but never abort the batch. A run where no image produced a
//! label is a run-level failure, since there is nothing to train on.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Semaphore;

use crate::config::Config;
use crate::dataset::{DatasetPartitioner, DatasetSplit};
use crate::error::{LabelError, PipelineError};
use crate::labeling::{label_path, ImageLabels, LabelingEngine, WriteGuard};
use crate::pipeline::{DiscoveredFile, FileDiscovery};

/// What happened to one discovered image.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// At least one label written; the image joins the dataset
    Labeled { records: usize, candidates: usize },
    /// Empty label file written; the image is left out of the dataset
    NoDetections { candidates: usize },
    /// Skipped; no label file written
    Failed { error: String },
}

/// Per-image status, streamed to the caller as images complete.
#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    /// 1-based position in discovery order
    pub index: usize,
    pub total: usize,
    pub image_path: PathBuf,
    #[serde(flatten)]
    pub status: ItemStatus,
    pub elapsed_ms: u64,
}

impl ItemReport {
    pub fn is_successful(&self) -> bool {
        matches!(self.status, ItemStatus::Labeled { .. })
    }
}

impl fmt::Display for ItemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self
            .image_path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        write!(f, "Processing {}/{}: {} - ", self.index, self.total, name)?;
        match &self.status {
            ItemStatus::Labeled { records, candidates } => {
                write!(f, "{records} label(s) from {candidates} candidate(s)")
            }
            ItemStatus::NoDetections { candidates } => {
                write!(f, "no logo among {candidates} candidate(s)")
            }
            ItemStatus::Failed { error } => write!(f, "failed: {error}"),
        }
    }
}

/// Aggregate result of labeling a directory.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    /// Per-image reports in discovery order
    pub items: Vec<ItemReport>,
    /// Successfully labeled images in discovery order
    pub successful: Vec<PathBuf>,
    pub elapsed_ms: u64,
}

impl BatchReport {
    pub fn discovered(&self) -> usize {
        self.items.len()
    }

    pub fn labeled(&self) -> usize {
        self.successful.len()
    }

    pub fn empty(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.status, ItemStatus::NoDetections { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.status, ItemStatus::Failed { .. }))
            .count()
    }

    /// Fail the run when not a single image was labeled.
    pub fn require_labeled(&self) -> Result<(), LabelError> {
        if self.successful.is_empty() {
            return Err(LabelError::NoImagesLabeled {
                discovered: self.discovered(),
                failed: self.failed(),
            });
        }
        Ok(())
    }
}

/// Labeling run followed by the train/val split.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedDataset {
    pub report: BatchReport,
    pub split: DatasetSplit,
}

/// Walks an input directory and labels every supported image.
pub struct BatchDriver {
    engine: Arc<LabelingEngine>,
    discovery: FileDiscovery,
    parallel_workers: usize,
    image_timeout_ms: u64,
}

impl BatchDriver {
    pub fn new(engine: Arc<LabelingEngine>, config: &Config) -> Self {
        Self {
            engine,
            discovery: FileDiscovery::new(config.processing.clone()),
            parallel_workers: config.processing.parallel_workers.max(1),
            image_timeout_ms: config.limits.image_timeout_ms,
        }
    }

    /// Discover the images `run` would process, sorted by path.
    pub fn discover(&self, input_dir: &Path) -> Vec<DiscoveredFile> {
        self.discovery.discover(input_dir)
    }

    /// Label every image in `input_dir`, writing label files to `output_dir`.
    pub async fn run(&self, input_dir: &Path, output_dir: &Path) -> Result<BatchReport, LabelError> {
        self.run_with_progress(input_dir, output_dir, |_| {}).await
    }

    /// Like [`run`](Self::run), calling `on_item` as each image completes.
    ///
    /// Completion order may differ from discovery order when more than one
    /// worker is configured; the returned report is always in discovery order.
    pub async fn run_with_progress<F>(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        on_item: F,
    ) -> Result<BatchReport, LabelError>
    where
        F: Fn(&ItemReport) + Send + Sync + 'static,
    {
        let start = Instant::now();
        std::fs::create_dir_all(output_dir)?;

        let files = self.discover(input_dir);
        let total = files.len();
        tracing::info!("Found {} images for processing", total);

        let semaphore = Arc::new(Semaphore::new(self.parallel_workers));
        let on_item = Arc::new(on_item);
        let mut handles = Vec::with_capacity(total);
        let mut claimed: HashMap<PathBuf, PathBuf> = HashMap::new();

        for (i, file) in files.into_iter().enumerate() {
            let index = i + 1;
            let image_path = file.path;

            // Two images with the same stem would race for one label file.
            let target = label_path(output_dir, &image_path);
            if let Some(owner) = claimed.get(&target) {
                let error = PipelineError::DuplicateStem {
                    label_path: target,
                    claimed_by: owner.clone(),
                };
                tracing::warn!("Skipping {:?}: {}", image_path, error);
                let report = ItemReport {
                    index,
                    total,
                    image_path,
                    status: ItemStatus::Failed {
                        error: error.to_string(),
                    },
                    elapsed_ms: 0,
                };
                on_item(&report);
                handles.push(tokio::spawn(async move { report }));
                continue;
            }
            claimed.insert(target, image_path.clone());

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::warn!("Worker semaphore closed unexpectedly, stopping batch");
                    break;
                }
            };

            let engine = self.engine.clone();
            let output_dir = output_dir.to_path_buf();
            let on_item = on_item.clone();
            let timeout_ms = self.image_timeout_ms;

            handles.push(tokio::spawn(async move {
                let item_start = Instant::now();
                let result = label_with_timeout(engine, &image_path, output_dir, timeout_ms).await;
                drop(permit);

                let report = ItemReport {
                    index,
                    total,
                    status: status_for(&image_path, result),
                    image_path,
                    elapsed_ms: item_start.elapsed().as_millis() as u64,
                };
                on_item(&report);
                report
            }));
        }

        let mut items = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => items.push(report),
                Err(e) => tracing::error!("Labeling task panicked: {e}"),
            }
        }
        items.sort_by_key(|item| item.index);

        let successful: Vec<PathBuf> = items
            .iter()
            .filter(|item| item.is_successful())
            .map(|item| item.image_path.clone())
            .collect();

        let report = BatchReport {
            items,
            successful,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        tracing::info!(
            "Labeled {} of {} image(s) ({} without detections, {} failed)",
            report.labeled(),
            report.discovered(),
            report.empty(),
            report.failed()
        );
        Ok(report)
    }

    /// Label `input_dir` into `labels_dir`, then split the labeled images
    /// into `train.txt` / `val.txt` under `dataset_root`.
    pub async fn prepare_dataset<F>(
        &self,
        input_dir: &Path,
        labels_dir: &Path,
        dataset_root: &Path,
        partitioner: &DatasetPartitioner,
        on_item: F,
    ) -> Result<PreparedDataset, LabelError>
    where
        F: Fn(&ItemReport) + Send + Sync + 'static,
    {
        let report = self
            .run_with_progress(input_dir, labels_dir, on_item)
            .await?;
        report.require_labeled()?;
        let split = partitioner.split(&report.successful, dataset_root)?;
        Ok(PreparedDataset { report, split })
    }
}

/// Run the blocking engine call off the async runtime under a time budget.
///
/// A timed-out image is reported as failed. Its blocking task keeps running
/// in the background, but the write guard is cancelled first, so the image
/// ends up with no label file either way.
async fn label_with_timeout(
    engine: Arc<LabelingEngine>,
    image_path: &Path,
    output_dir: PathBuf,
    timeout_ms: u64,
) -> Result<ImageLabels, PipelineError> {
    let target = label_path(&output_dir, image_path);
    let guard = WriteGuard::new();
    let task_guard = guard.clone();
    let path = image_path.to_path_buf();
    let task = tokio::task::spawn_blocking(move || {
        engine.label_image_guarded(&path, &output_dir, &task_guard)
    });

    let error = match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
        Ok(Ok(result)) => return result,
        Ok(Err(e)) => PipelineError::Model {
            message: format!("Labeling task failed for {:?}: {e}", image_path),
        },
        Err(_) => PipelineError::Timeout {
            path: image_path.to_path_buf(),
            stage: "label".to_string(),
            timeout_ms,
        },
    };

    if let Err(e) = guard.cancel(&target) {
        tracing::warn!("Could not remove label file {:?}: {}", target, e);
    }
    Err(error)
}

fn status_for(image_path: &Path, result: Result<ImageLabels, PipelineError>) -> ItemStatus {
    match result {
        Ok(labels) if labels.is_successful() => ItemStatus::Labeled {
            records: labels.records.len(),
            candidates: labels.candidates,
        },
        Ok(labels) => ItemStatus::NoDetections {
            candidates: labels.candidates,
        },
        Err(e) => {
            tracing::error!("Failed: {:?} - {}", image_path, e);
            ItemStatus::Failed {
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(index: usize, status: ItemStatus) -> ItemReport {
        ItemReport {
            index,
            total: 3,
            image_path: PathBuf::from(format!("/raw/img{index}.jpg")),
            status,
            elapsed_ms: 5,
        }
    }

    #[test]
    fn test_item_report_status_line() {
        let line = report(
            2,
            ItemStatus::Labeled {
                records: 1,
                candidates: 4,
            },
        )
        .to_string();
        assert_eq!(
            line,
            "Processing 2/3: img2.jpg - 1 label(s) from 4 candidate(s)"
        );

        let line = report(
            3,
            ItemStatus::Failed {
                error: "boom".into(),
            },
        )
        .to_string();
        assert!(line.ends_with("failed: boom"));
    }

    #[test]
    fn test_batch_report_counts() {
        let items = vec![
            report(
                1,
                ItemStatus::Labeled {
                    records: 2,
                    candidates: 2,
                },
            ),
            report(2, ItemStatus::NoDetections { candidates: 3 }),
            report(
                3,
                ItemStatus::Failed {
                    error: "x".into(),
                },
            ),
        ];
        let batch = BatchReport {
            successful: vec![items[0].image_path.clone()],
            items,
            elapsed_ms: 10,
        };
        assert_eq!(batch.discovered(), 3);
        assert_eq!(batch.labeled(), 1);
        assert_eq!(batch.empty(), 1);
        assert_eq!(batch.failed(), 1);
        assert!(batch.require_labeled().is_ok());
    }

    #[test]
    fn test_require_labeled_fails_on_empty_run() {
        let batch = BatchReport {
            items: vec![report(1, ItemStatus::NoDetections { candidates: 0 })],
            successful: vec![],
            elapsed_ms: 1,
        };
        let err = batch.require_labeled().unwrap_err();
        assert!(matches!(
            err,
            LabelError::NoImagesLabeled {
                discovered: 1,
                failed: 0
            }
        ));
    }

    mod end_to_end {
        use super::super::*;
        use crate::detection::CandidateDetector;
        use crate::labeling::AcceptancePolicy;
        use crate::matching::SemanticMatcher;
        use crate::types::{BoundingBox, Candidate, MatchScores, PromptSet};
        use image::{DynamicImage, Rgb, RgbImage};
        use std::sync::Mutex;

        /// Proposes the left half of every image.
        struct HalfDetector;

        impl CandidateDetector for HalfDetector {
            fn propose(
                &self,
                image: &DynamicImage,
                _: &Path,
            ) -> Result<Vec<Candidate>, PipelineError> {
                Ok(vec![Candidate {
                    bbox: BoundingBox::new(0.0, 0.0, image.width() as f32 / 2.0, image.height() as f32),
                    confidence: 0.9,
                    class_id: 0,
                }])
            }
        }

        /// Treats red patches as the logo and errors on green ones.
        struct RedMatcher {
            delay: Duration,
        }

        impl SemanticMatcher for RedMatcher {
            fn classify(
                &self,
                patch: &DynamicImage,
                prompts: &PromptSet,
                image_path: &Path,
            ) -> Result<MatchScores, PipelineError> {
                std::thread::sleep(self.delay);
                let pixel = *patch.to_rgb8().get_pixel(0, 0);
                if pixel[1] > 128 && pixel[0] < 128 {
                    return Err(PipelineError::Matching {
                        path: image_path.to_path_buf(),
                        message: "session run failed".to_string(),
                    });
                }
                let red = pixel[0] > 128;
                let pos = if red { 0.9 } else { 0.05 };
                let mut probs = vec![0.0; prompts.len()];
                probs[0] = pos;
                probs[prompts.positive().len()] = 1.0 - pos;
                Ok(MatchScores::from_joint(probs, prompts.positive().len()))
            }
        }

        fn driver(config: &Config, delay: Duration) -> BatchDriver {
            let engine = LabelingEngine::new(
                Arc::new(HalfDetector),
                Arc::new(RedMatcher { delay }),
                PromptSet::from(&config.prompts),
                AcceptancePolicy::from(&config.matcher),
                config,
            );
            BatchDriver::new(Arc::new(engine), config)
        }

        fn save(dir: &Path, name: &str, color: [u8; 3]) -> PathBuf {
            let path = dir.join(name);
            RgbImage::from_pixel(40, 30, Rgb(color)).save(&path).unwrap();
            path
        }

        #[tokio::test]
        async fn test_prepare_dataset_labels_and_splits() {
            let dir = tempfile::tempdir().unwrap();
            let raw = dir.path().join("raw");
            std::fs::create_dir(&raw).unwrap();
            let mut reds = Vec::new();
            for i in 0..5 {
                reds.push(save(&raw, &format!("red_{i}.png"), [220, 10, 10]));
            }
            save(&raw, "blue_0.png", [10, 10, 220]);
            std::fs::write(raw.join("broken.jpg"), b"\xFF\xD8\xFF not a jpeg").unwrap();
            std::fs::write(raw.join("notes.txt"), "ignored").unwrap();

            let mut config = Config::default();
            config.processing.parallel_workers = 2;
            let driver = driver(&config, Duration::ZERO);
            let partitioner = DatasetPartitioner::new(0.2, 42).unwrap();
            let labels = dir.path().join("labels");
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = seen.clone();

            let prepared = driver
                .prepare_dataset(&raw, &labels, dir.path(), &partitioner, move |item| {
                    sink.lock().unwrap().push(item.index);
                })
                .await
                .unwrap();

            let report = &prepared.report;
            assert_eq!(report.discovered(), 7);
            assert_eq!(report.labeled(), 5);
            assert_eq!(report.empty(), 1);
            assert_eq!(report.failed(), 1);
            assert_eq!(seen.lock().unwrap().len(), 7);

            // Discovery order is sorted by path.
            let indices: Vec<_> = report.items.iter().map(|i| i.index).collect();
            assert_eq!(indices, (1..=7).collect::<Vec<_>>());
            assert_eq!(report.successful, reds);

            let red_label = std::fs::read_to_string(labels.join("red_0.txt")).unwrap();
            assert_eq!(red_label, "0 0.250000 0.500000 0.500000 1.000000");
            assert_eq!(std::fs::read_to_string(labels.join("blue_0.txt")).unwrap(), "");
            assert!(!labels.join("broken.txt").exists());
            assert!(!labels.join("notes.txt").exists());

            assert_eq!(prepared.split.val.len(), 1);
            assert_eq!(prepared.split.train.len(), 4);
            let train = crate::dataset::read_manifest(&dir.path().join("train.txt")).unwrap();
            let val = crate::dataset::read_manifest(&dir.path().join("val.txt")).unwrap();
            assert_eq!(train, prepared.split.train);
            assert_eq!(val, prepared.split.val);
        }

        #[tokio::test]
        async fn test_run_without_logos_is_run_level_failure() {
            let dir = tempfile::tempdir().unwrap();
            save(dir.path(), "blue.png", [0, 0, 255]);
            let labels = dir.path().join("labels");

            let config = Config::default();
            let partitioner = DatasetPartitioner::from_config(&config.dataset).unwrap();
            let err = driver(&config, Duration::ZERO)
                .prepare_dataset(dir.path(), &labels, dir.path(), &partitioner, |_| {})
                .await
                .unwrap_err();

            assert!(matches!(
                err,
                LabelError::NoImagesLabeled {
                    discovered: 1,
                    failed: 0
                }
            ));
            assert!(!dir.path().join("train.txt").exists());
        }

        #[tokio::test]
        async fn test_empty_directory_labels_nothing() {
            let dir = tempfile::tempdir().unwrap();
            let report = driver(&Config::default(), Duration::ZERO)
                .run(dir.path(), &dir.path().join("labels"))
                .await
                .unwrap();
            assert_eq!(report.discovered(), 0);
            assert!(report.require_labeled().is_err());
        }

        #[tokio::test]
        async fn test_duplicate_stem_skipped() {
            let dir = tempfile::tempdir().unwrap();
            let raw = dir.path().join("raw");
            std::fs::create_dir(&raw).unwrap();
            let first = save(&raw, "logo.bmp", [255, 0, 0]);
            save(&raw, "logo.png", [255, 0, 0]);

            let report = driver(&Config::default(), Duration::ZERO)
                .run(&raw, &dir.path().join("labels"))
                .await
                .unwrap();

            assert_eq!(report.successful, vec![first]);
            assert_eq!(report.failed(), 1);
            match &report.items[1].status {
                ItemStatus::Failed { error } => assert!(error.contains("logo.bmp"), "{error}"),
                other => panic!("expected duplicate-stem failure, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_slow_image_times_out() {
            let dir = tempfile::tempdir().unwrap();
            save(dir.path(), "slow.png", [255, 0, 0]);

            let mut config = Config::default();
            config.limits.image_timeout_ms = 20;
            let report = driver(&config, Duration::from_millis(300))
                .run(dir.path(), &dir.path().join("labels"))
                .await
                .unwrap();

            assert_eq!(report.failed(), 1);
            match &report.items[0].status {
                ItemStatus::Failed { error } => assert!(error.contains("Timeout"), "{error}"),
                other => panic!("expected timeout, got {other:?}"),
            }
        }

        #[tokio::test]
        async fn test_timed_out_image_gets_no_label_file() {
            let dir = tempfile::tempdir().unwrap();
            let raw = dir.path().join("raw");
            std::fs::create_dir(&raw).unwrap();
            let image = save(&raw, "slow.png", [255, 0, 0]);
            let labels = dir.path().join("labels");

            let mut config = Config::default();
            config.limits.image_timeout_ms = 20;
            let report = driver(&config, Duration::from_millis(200))
                .run(&raw, &labels)
                .await
                .unwrap();
            assert_eq!(report.failed(), 1);

            // Let the abandoned blocking task run to completion.
            tokio::time::sleep(Duration::from_millis(600)).await;

            assert!(!labels.join("slow.txt").exists());
            let on_disk = crate::dataset::labeled_images(&[image], &labels);
            assert_eq!(on_disk, report.successful);
        }

        #[tokio::test]
        async fn test_failed_rerun_drops_previous_label() {
            let dir = tempfile::tempdir().unwrap();
            let raw = dir.path().join("raw");
            std::fs::create_dir(&raw).unwrap();
            let image = save(&raw, "logo.png", [255, 0, 0]);
            let labels = dir.path().join("labels");
            let driver = driver(&Config::default(), Duration::ZERO);

            let first = driver.run(&raw, &labels).await.unwrap();
            assert_eq!(first.successful, vec![image.clone()]);
            assert!(!std::fs::read_to_string(labels.join("logo.txt")).unwrap().is_empty());

            // Same stem, but the matcher now errors on it.
            save(&raw, "logo.png", [0, 255, 0]);
            let second = driver.run(&raw, &labels).await.unwrap();

            assert_eq!(second.failed(), 1);
            assert!(second.successful.is_empty());
            assert!(!labels.join("logo.txt").exists());
            let on_disk = crate::dataset::labeled_images(&[image], &labels);
            assert_eq!(on_disk, second.successful);
        }

        #[tokio::test]
        async fn test_matcher_error_fails_only_that_image() {
            let dir = tempfile::tempdir().unwrap();
            let raw = dir.path().join("raw");
            std::fs::create_dir(&raw).unwrap();
            let a = save(&raw, "a.png", [255, 0, 0]);
            save(&raw, "b.png", [0, 255, 0]);
            let c = save(&raw, "c.png", [255, 0, 0]);
            let labels = dir.path().join("labels");

            let mut config = Config::default();
            config.processing.parallel_workers = 3;
            let report = driver(&config, Duration::ZERO).run(&raw, &labels).await.unwrap();

            assert_eq!(report.labeled(), 2);
            assert_eq!(report.successful, vec![a, c]);
            match &report.items[1].status {
                ItemStatus::Failed { error } => {
                    assert!(error.contains("Matching failed"), "{error}")
                }
                other => panic!("expected matcher failure, got {other:?}"),
            }
            assert!(labels.join("a.txt").exists());
            assert!(!labels.join("b.txt").exists());
            assert!(labels.join("c.txt").exists());
        }

        #[tokio::test]
        async fn test_unwritable_label_is_reported_per_image() {
            let dir = tempfile::tempdir().unwrap();
            let raw = dir.path().join("raw");
            std::fs::create_dir(&raw).unwrap();
            save(&raw, "a.png", [255, 0, 0]);
            let b = save(&raw, "b.png", [255, 0, 0]);
            let labels = dir.path().join("labels");
            std::fs::create_dir_all(labels.join("a.txt")).unwrap();

            let report = driver(&Config::default(), Duration::ZERO)
                .run(&raw, &labels)
                .await
                .unwrap();

            assert_eq!(report.successful, vec![b]);
            match &report.items[0].status {
                ItemStatus::Failed { error } => {
                    assert!(error.contains("Failed to write label file"), "{error}")
                }
                other => panic!("expected write failure, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_item_report_serializes_status_tag() {
        let json = serde_json::to_value(report(1, ItemStatus::NoDetections { candidates: 2 }))
            .unwrap();
        assert_eq!(json["status"], "no_detections");
        assert_eq!(json["candidates"], 2);
    }
}
