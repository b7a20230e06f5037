//! Subcommand implementations.

pub mod config;
pub mod label;
pub mod split;

use std::path::{Path, PathBuf};

use logolabel_core::{Config, ConfigError};

/// The config file in effect: `--config` if given, else the platform default.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(Config::default_path)
}

/// Load configuration from `--config` or the default location.
///
/// An explicit path must exist; the default path falls back to defaults.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    match explicit {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

/// Config used to set up logging before a command runs.
///
/// A broken config file only downgrades logging to defaults. Commands load
/// the file again and fail on it.
pub fn startup_config(explicit: Option<&Path>) -> (Config, Option<String>) {
    match load_config(explicit) {
        Ok(config) => (config, None),
        Err(e) => {
            let warning = format!(
                "Warning: Failed to load config: {e}\n  \
                 Logging falls back to defaults until the config is fixed. \
                 Check the file with `logolabel config path`."
            );
            (Config::default(), Some(warning))
        }
    }
}
