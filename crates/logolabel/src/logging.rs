//! Logging initialization.
//!
//! Per-image status lines and run milestones go through `tracing`. Output is
//! always stderr, so stdout stays free for `config show` and JSON reports.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global subscriber at `level` (e.g. "info", "debug").
///
/// `RUST_LOG`, when set, takes precedence over `level`.
pub fn init(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Initialize logging from the `[logging]` config section and CLI flags.
pub fn init_from_config(
    config: &logolabel_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) {
    init(
        &effective_level(&config.logging.level, verbose_override),
        json_logs_override || config.logging.format == "json",
    );
}

/// `--verbose` raises the configured level to at least debug.
fn effective_level(configured: &str, verbose: bool) -> String {
    let configured = configured.trim().to_ascii_lowercase();
    if verbose && !matches!(configured.as_str(), "debug" | "trace") {
        return "debug".to_string();
    }
    if configured.is_empty() {
        return "info".to_string();
    }
    configured
}
