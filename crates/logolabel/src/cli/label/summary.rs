//! Progress display, run summary and the JSON run report.

use std::path::{Path, PathBuf};
use std::time::Duration;

use logolabel_core::{BatchReport, DatasetSplit};
use serde::Serialize;

use super::setup::LabelContext;

/// Create a progress bar for the labeling run.
pub fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-");
    pb.set_style(style);
    pb.set_message("loading...");
    pb
}

/// Print a formatted summary table after labeling.
pub fn print_summary(report: &BatchReport, elapsed: Duration) {
    let rate = if elapsed.as_secs_f64() > 0.0 {
        report.discovered() as f64 / elapsed.as_secs_f64()
    } else {
        0.0
    };
    let labels: usize = report
        .items
        .iter()
        .map(|item| match item.status {
            logolabel_core::ItemStatus::Labeled { records, .. } => records,
            _ => 0,
        })
        .sum();

    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    eprintln!("    Labeled:      {:>8}", report.labeled());
    eprintln!("    No logo:      {:>8}", report.empty());
    if report.failed() > 0 {
        eprintln!("    Failed:       {:>8}", report.failed());
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Images:       {:>8}", report.discovered());
    eprintln!("    Boxes:        {:>8}", labels);
    eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("    Rate:         {:>7.1} img/sec", rate);
    eprintln!("  ====================================");
}

/// Report where the manifests went.
pub fn print_split(split: &DatasetSplit, dataset_dir: &Path) {
    eprintln!(
        "    Split:        {} train / {} val -> {}",
        split.train.len(),
        split.val.len(),
        dataset_dir.display()
    );
}

#[derive(Serialize)]
struct RunReport<'a> {
    version: &'static str,
    input: &'a Path,
    labels_dir: &'a Path,
    dataset_dir: Option<&'a PathBuf>,
    positive_threshold: f32,
    confidence_threshold: f32,
    #[serde(flatten)]
    batch: &'a BatchReport,
    split: Option<&'a DatasetSplit>,
}

/// Write the run (and split, when one was made) as pretty JSON.
pub(crate) fn write_report(
    path: &Path,
    ctx: &LabelContext,
    batch: &BatchReport,
    split: Option<&DatasetSplit>,
) -> anyhow::Result<()> {
    let report = RunReport {
        version: logolabel_core::VERSION,
        input: &ctx.input,
        labels_dir: &ctx.labels_dir,
        dataset_dir: split.map(|_| &ctx.dataset_dir),
        positive_threshold: ctx.config.matcher.positive_threshold,
        confidence_threshold: ctx.config.detector.confidence_threshold,
        batch,
        split,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
    Ok(())
}
