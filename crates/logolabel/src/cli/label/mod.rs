//! The `logolabel label` command: label a directory, then split it.

mod setup;
mod summary;

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::Args;
use logolabel_core::ItemReport;

use setup::setup_labeling;
use summary::{create_progress_bar, print_split, print_summary, write_report};

/// Arguments for the `label` command.
#[derive(Args, Debug, Default)]
pub struct LabelArgs {
    /// Directory of raw images (defaults to `dataset.raw_dir`)
    pub input: Option<PathBuf>,

    /// Directory receiving one label file per image (defaults to `dataset.labels_dir`)
    #[arg(long)]
    pub labels_dir: Option<PathBuf>,

    /// Dataset root receiving train.txt and val.txt (defaults to `dataset.root`)
    #[arg(long)]
    pub dataset_dir: Option<PathBuf>,

    /// Number of images labeled concurrently
    #[arg(short, long)]
    pub parallel: Option<usize>,

    /// Detector confidence threshold for candidate regions
    #[arg(long)]
    pub confidence: Option<f32>,

    /// Minimum best-positive probability for accepting a candidate
    #[arg(long)]
    pub positive_threshold: Option<f32>,

    /// Negative-probability ceiling (stored, not used for acceptance)
    #[arg(long)]
    pub negative_threshold: Option<f32>,

    /// Fraction of labeled images assigned to validation
    #[arg(long)]
    pub val_fraction: Option<f64>,

    /// Seed for the train/val shuffle
    #[arg(long)]
    pub seed: Option<u64>,

    /// Write label files only; leave train.txt / val.txt untouched
    #[arg(long)]
    pub no_split: bool,

    /// Write a JSON run report to this file
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Execute the label command.
pub async fn execute(args: LabelArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let ctx = setup_labeling(&args, config_path)?;

    let total = ctx.driver.discover(&ctx.input).len();
    if total == 0 {
        anyhow::bail!(
            "No supported images found in {:?}\n\n  Hint: expected files with extensions: {}",
            ctx.input,
            ctx.config.processing.supported_formats.join(", ")
        );
    }

    let start = Instant::now();
    let progress = create_progress_bar(total as u64);
    let progress_cb = progress.clone();
    let on_item = move |item: &ItemReport| {
        progress_cb.suspend(|| tracing::info!("{item}"));
        progress_cb.set_message(
            item.image_path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        progress_cb.inc(1);
    };

    let report = ctx
        .driver
        .run_with_progress(&ctx.input, &ctx.labels_dir, on_item)
        .await?;
    progress.finish_and_clear();
    print_summary(&report, start.elapsed());

    let outcome = report
        .require_labeled()
        .map_err(anyhow::Error::from)
        .and_then(|()| match &ctx.partitioner {
            Some(partitioner) => Ok(Some(partitioner.split(&report.successful, &ctx.dataset_dir)?)),
            None => Ok(None),
        });

    if let Some(path) = &args.report {
        let split = outcome.as_ref().ok().and_then(Option::as_ref);
        write_report(path, &ctx, &report, split)?;
        tracing::info!("Run report written to {:?}", path);
    }

    match outcome? {
        Some(split) => print_split(&split, &ctx.dataset_dir),
        None => tracing::info!("Skipping train/val split (--no-split)"),
    }

    println!("Markup completed successfully!");
    Ok(())
}
