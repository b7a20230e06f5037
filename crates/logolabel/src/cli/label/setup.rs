//! Label setup: config overrides, model checks, engine and driver creation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use logolabel_core::{
    BatchDriver, ClipMatcher, Config, DatasetPartitioner, LabelingEngine, YoloDetector,
};

use super::LabelArgs;

/// Everything the label command needs after setup.
pub(crate) struct LabelContext {
    pub config: Config,
    pub input: PathBuf,
    pub labels_dir: PathBuf,
    pub dataset_dir: PathBuf,
    pub driver: BatchDriver,
    /// `None` with `--no-split`
    pub partitioner: Option<DatasetPartitioner>,
}

/// Validate paths, load config and models, and assemble the batch driver.
pub(crate) fn setup_labeling(args: &LabelArgs, config_path: Option<&Path>) -> anyhow::Result<LabelContext> {
    let mut config = crate::cli::load_config(config_path)?;
    apply_overrides(&mut config, args);
    config.validate()?;

    let input = args.input.clone().unwrap_or_else(|| config.dataset.raw_dir.clone());
    if !input.is_dir() {
        anyhow::bail!(
            "Input directory does not exist: {:?}\n\n  Hint: Pass a directory of images or set dataset.raw_dir.",
            input
        );
    }
    let labels_dir = args
        .labels_dir
        .clone()
        .unwrap_or_else(|| config.dataset.labels_dir.clone());
    let dataset_dir = args
        .dataset_dir
        .clone()
        .unwrap_or_else(|| config.dataset.root.clone());

    let partitioner = if args.no_split {
        None
    } else {
        Some(DatasetPartitioner::from_config(&config.dataset)?)
    };

    check_models(&config)?;
    let engine = LabelingEngine::from_config(&config)?;
    tracing::info!(
        "Models loaded: detector {}, matcher {} ({} positive / {} negative prompts)",
        config.detector.model,
        config.matcher.model,
        engine.prompts().positive().len(),
        engine.prompts().negative().len()
    );
    let driver = BatchDriver::new(Arc::new(engine), &config);

    Ok(LabelContext {
        config,
        input,
        labels_dir,
        dataset_dir,
        driver,
        partitioner,
    })
}

/// Apply command-line overrides on top of the loaded config.
fn apply_overrides(config: &mut Config, args: &LabelArgs) {
    if let Some(parallel) = args.parallel {
        config.processing.parallel_workers = parallel;
    }
    if let Some(confidence) = args.confidence {
        config.detector.confidence_threshold = confidence;
    }
    if let Some(threshold) = args.positive_threshold {
        config.matcher.positive_threshold = threshold;
    }
    if let Some(threshold) = args.negative_threshold {
        config.matcher.negative_threshold = threshold;
    }
    if let Some(fraction) = args.val_fraction {
        config.dataset.val_fraction = fraction;
    }
    if let Some(seed) = args.seed {
        config.dataset.seed = seed;
    }
}

/// Fail early with a hint when model files are missing.
fn check_models(config: &Config) -> anyhow::Result<()> {
    let model_dir = config.model_dir();

    if !YoloDetector::model_exists(&config.detector, &model_dir) {
        anyhow::bail!(
            "Detector model not found at {:?}\n\n  Hint: Export {} to ONNX and place it there, \
             or set general.model_dir / detector.model.",
            YoloDetector::model_path(&config.detector, &model_dir),
            config.detector.model
        );
    }
    if !ClipMatcher::model_exists(&config.matcher, &model_dir) {
        anyhow::bail!(
            "Matcher model not found in {:?}\n\n  Hint: The directory needs visual.onnx, \
             text_model.onnx and tokenizer.json for {}.",
            ClipMatcher::model_dir(&config.matcher, &model_dir),
            config.matcher.model
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        args: LabelArgs,
    }

    fn parse(argv: &[&str]) -> LabelArgs {
        TestCli::parse_from(std::iter::once("label").chain(argv.iter().copied())).args
    }

    #[test]
    fn test_no_flags_keep_config() {
        let mut config = Config::default();
        apply_overrides(&mut config, &parse(&[]));
        assert_eq!(config.processing.parallel_workers, 4);
        assert_eq!(config.matcher.positive_threshold, 0.7);
        assert_eq!(config.dataset.seed, 42);
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        let args = parse(&[
            "raw",
            "--parallel",
            "1",
            "--confidence",
            "0.25",
            "--positive-threshold",
            "0.8",
            "--val-fraction",
            "0.1",
            "--seed",
            "7",
            "--no-split",
        ]);
        apply_overrides(&mut config, &args);

        assert_eq!(args.input, Some(PathBuf::from("raw")));
        assert!(args.no_split);
        assert_eq!(config.processing.parallel_workers, 1);
        assert_eq!(config.detector.confidence_threshold, 0.25);
        assert_eq!(config.matcher.positive_threshold, 0.8);
        assert_eq!(config.dataset.val_fraction, 0.1);
        assert_eq!(config.dataset.seed, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_override_rejected() {
        let mut config = Config::default();
        apply_overrides(&mut config, &parse(&["--val-fraction", "1.5"]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_input_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("config.toml");
        std::fs::write(&config_file, "").unwrap();

        let args = LabelArgs {
            input: Some(dir.path().join("does-not-exist")),
            ..Default::default()
        };
        let err = setup_labeling(&args, Some(&config_file)).err().unwrap();
        assert!(err.to_string().contains("does not exist"));
    }
}
