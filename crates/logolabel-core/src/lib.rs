//! Logolabel Core - zero-shot bounding-box labeling for logo datasets.
//!
//! Turns a folder of unlabeled images into a YOLO-format training set for one
//! target logo, with no human annotation:
//!
//! ```text
//! Image → Decode → Detect (YOLOv8) → Crop → Match (CLIP) → Accept → {stem}.txt
//!                                                               ↓
//!                                          labeled images → train.txt / val.txt
//! ```
//!
//! A general-purpose detector proposes regions; each region is kept only if
//! a vision-language model rates it as the logo with high confidence and
//! more likely than any "not the logo" description.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use logolabel_core::{BatchDriver, Config, DatasetPartitioner, LabelingEngine};
//!
//! #[tokio::main]
//! async fn main() -> logolabel_core::Result<()> {
//!     let config = Config::load()?;
//!     let engine = Arc::new(LabelingEngine::from_config(&config)?);
//!     let driver = BatchDriver::new(engine, &config);
//!     let partitioner = DatasetPartitioner::from_config(&config.dataset)?;
//!
//!     let prepared = driver
//!         .prepare_dataset(
//!             &config.dataset.raw_dir,
//!             &config.dataset.labels_dir,
//!             &config.dataset.root,
//!             &partitioner,
//!             |item| println!("{item}"),
//!         )
//!         .await?;
//!     println!("{} train / {} val", prepared.split.train.len(), prepared.split.val.len());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod config;
pub mod dataset;
pub mod detection;
pub mod error;
pub mod labeling;
pub mod matching;
pub mod math;
pub mod pipeline;
pub mod types;

pub use batch::{BatchDriver, BatchReport, ItemReport, ItemStatus, PreparedDataset};
pub use config::Config;
pub use dataset::{DatasetPartitioner, DatasetSplit};
pub use detection::{CandidateDetector, YoloDetector};
pub use error::{ConfigError, LabelError, PipelineError, PipelineResult, Result, SplitError};
pub use labeling::{AcceptancePolicy, ImageLabels, LabelRecord, LabelingEngine, WriteGuard};
pub use matching::{ClipMatcher, SemanticMatcher};
pub use types::{BoundingBox, Candidate, MatchScores, PromptSet};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
