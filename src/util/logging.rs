// TunnelWatch - util/logging.rs
//
// Structured logging with runtime-selectable debug mode.
//
// Activation:
//   - Environment variable: RUST_LOG=debug (or trace)
//   - CLI flag: --debug
//   - Config file: [logging] level = "debug"
//
// Output: stderr by default, or the file named by [logging] file.
// Never logs full request headers or other viewer-supplied payloads above
// debug level.

use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Build the env filter.
///
/// Priority: RUST_LOG env var > CLI --debug flag > config level > default "info".
fn build_filter(debug_flag: bool, config_level: Option<&str>) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if debug_flag {
        EnvFilter::new("debug")
    } else if let Some(level) = config_level {
        EnvFilter::new(level)
    } else {
        EnvFilter::new(super::constants::DEFAULT_LOG_LEVEL)
    }
}

/// Initialise the logging subsystem.
///
/// `debug_flag` is true when the user passed --debug on the CLI.
/// `config_level` is the level from config.toml (if present).
/// `log_file` is the optional log file path from config.toml. If the file
/// cannot be opened, logging falls back to stderr and the failure is
/// reported once initialisation has completed.
pub fn init(debug_flag: bool, config_level: Option<&str>, log_file: Option<&str>) {
    let filter = build_filter(debug_flag, config_level);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .compact();

    let mut file_error = None;
    match log_file.map(open_log_file) {
        Some(Ok(file)) => builder
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init(),
        Some(Err(e)) => {
            file_error = Some(e);
            builder.init();
        }
        None => builder.init(),
    }

    if let (Some(e), Some(path)) = (file_error, log_file) {
        tracing::warn!(path, error = %e, "Cannot open log file; logging to stderr");
    }

    tracing::debug!(
        app = super::constants::APP_NAME,
        version = super::constants::APP_VERSION,
        "Logging initialised"
    );
}

fn open_log_file(path: &str) -> std::io::Result<std::fs::File> {
    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
}
