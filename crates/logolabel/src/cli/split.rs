//! The `logolabel split` command: re-partition an already labeled dataset.

use std::path::{Path, PathBuf};

use clap::Args;
use logolabel_core::dataset::labeled_images;
use logolabel_core::pipeline::FileDiscovery;
use logolabel_core::DatasetPartitioner;

/// Arguments for the `split` command.
#[derive(Args, Debug)]
pub struct SplitArgs {
    /// Directory of raw images (defaults to `dataset.raw_dir`)
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Directory holding the label files (defaults to `dataset.labels_dir`)
    #[arg(long)]
    pub labels_dir: Option<PathBuf>,

    /// Dataset root receiving train.txt and val.txt (defaults to `dataset.root`)
    #[arg(long)]
    pub dataset_dir: Option<PathBuf>,

    /// Fraction of labeled images assigned to validation
    #[arg(long)]
    pub val_fraction: Option<f64>,

    /// Seed for the train/val shuffle
    #[arg(long)]
    pub seed: Option<u64>,
}

/// Execute the split command.
pub async fn execute(args: SplitArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(fraction) = args.val_fraction {
        config.dataset.val_fraction = fraction;
    }
    if let Some(seed) = args.seed {
        config.dataset.seed = seed;
    }
    config.validate()?;

    let input = args.input.unwrap_or_else(|| config.dataset.raw_dir.clone());
    let labels_dir = args
        .labels_dir
        .unwrap_or_else(|| config.dataset.labels_dir.clone());
    let dataset_dir = args.dataset_dir.unwrap_or_else(|| config.dataset.root.clone());

    let images: Vec<PathBuf> = FileDiscovery::new(config.processing.clone())
        .discover(&input)
        .into_iter()
        .map(|file| file.path)
        .collect();
    let labeled = labeled_images(&images, &labels_dir);
    tracing::info!(
        "{} of {} image(s) in {:?} have labels in {:?}",
        labeled.len(),
        images.len(),
        input,
        labels_dir
    );

    if labeled.is_empty() {
        anyhow::bail!(
            "No labeled images found\n\n  Hint: Run `logolabel label` first, or point --labels-dir at an existing run."
        );
    }

    let partitioner = DatasetPartitioner::from_config(&config.dataset)?;
    let split = partitioner.split(&labeled, &dataset_dir)?;
    println!(
        "{} train / {} val -> {}",
        split.train.len(),
        split.val.len(),
        dataset_dir.display()
    );
    Ok(())
}
