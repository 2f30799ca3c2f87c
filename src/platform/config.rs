// TunnelWatch - platform/config.rs
//
// Platform-specific data directory resolution, config.toml loading and
// environment overrides, all validated at startup.
//
// Precedence (highest first): CLI flags (applied by main) > environment
// variables > config.toml > built-in defaults.
//
// Uses the `directories` crate for XDG (Linux), AppData (Windows),
// Library (macOS) compliance.

use crate::util::constants;
use crate::util::error::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Resolved platform paths for TunnelWatch data and configuration.
#[derive(Debug, Clone)]
pub struct PlatformPaths {
    /// Configuration directory (e.g. ~/.config/tunnelwatch/)
    pub config_dir: PathBuf,

    /// Data directory holding the persisted event history.
    pub data_dir: PathBuf,
}

impl PlatformPaths {
    /// Resolve platform-appropriate paths.
    ///
    /// Falls back to current directory if platform dirs cannot be determined
    /// (e.g. a container without a home directory).
    pub fn resolve() -> Self {
        if let Some(proj_dirs) = ProjectDirs::from("", "", constants::APP_ID) {
            let config_dir = proj_dirs.config_dir().to_path_buf();
            let data_dir = proj_dirs.data_dir().to_path_buf();

            tracing::debug!(
                config = %config_dir.display(),
                data = %data_dir.display(),
                "Platform paths resolved"
            );

            Self {
                config_dir,
                data_dir,
            }
        } else {
            let fallback = PathBuf::from(".");
            tracing::warn!("Could not determine platform directories; using current directory");
            Self {
                config_dir: fallback.clone(),
                data_dir: fallback,
            }
        }
    }
}

// =============================================================================
// config.toml
// =============================================================================

/// Raw deserialisable shape of config.toml.
///
/// Unknown keys are silently ignored for forward compatibility.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// `[store]` section.
    pub store: StoreSection,
    /// `[source]` section.
    pub source: SourceSection,
    /// `[server]` section.
    pub server: ServerSection,
    /// `[logging]` section.
    pub logging: LoggingSection,
}

/// `[store]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// Maximum retained events.
    pub max_entries: Option<usize>,
    /// Backing JSON-lines file.
    pub file: Option<String>,
    /// Appends between two trims of the backing file.
    pub trim_interval: Option<usize>,
}

/// `[source]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct SourceSection {
    /// Explicit container name.
    pub container: Option<String>,
    /// Discovery label (`key=value`); empty string disables label lookup.
    pub label: Option<String>,
    /// Last-resort container name.
    pub fallback_container: Option<String>,
}

/// `[server]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Listen address, e.g. "127.0.0.1:8080".
    pub bind: Option<String>,
    /// Events buffered per viewer.
    pub subscriber_buffer: Option<usize>,
    /// Idle seconds between SSE keep-alive frames.
    pub keepalive_secs: Option<u64>,
}

/// `[logging]` config section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub level: Option<String>,
    /// Log file path (empty = stderr only).
    pub file: Option<String>,
}

/// Validated application configuration.
///
/// Invalid values produce actionable warnings and fall back to defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    // -- Store --
    pub max_entries: usize,
    /// Explicit backing file; `None` means `<data_dir>/events.jsonl`.
    pub events_file: Option<PathBuf>,
    pub trim_interval: usize,

    // -- Source --
    pub container: Option<String>,
    pub container_label: Option<String>,
    pub fallback_container: String,

    // -- Server --
    pub bind_addr: String,
    pub subscriber_buffer: usize,
    pub keepalive_secs: u64,

    // -- Logging --
    /// Logging level string (for init before tracing is available).
    pub log_level: Option<String>,
    /// Log file path.
    pub log_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_entries: constants::DEFAULT_MAX_ENTRIES,
            events_file: None,
            trim_interval: constants::DEFAULT_TRIM_INTERVAL,
            container: None,
            container_label: Some(constants::DEFAULT_CONTAINER_LABEL.to_string()),
            fallback_container: constants::DEFAULT_FALLBACK_CONTAINER.to_string(),
            bind_addr: constants::DEFAULT_BIND_ADDR.to_string(),
            subscriber_buffer: constants::DEFAULT_SUBSCRIBER_BUFFER,
            keepalive_secs: constants::DEFAULT_KEEPALIVE_SECS,
            log_level: None,
            log_file: None,
        }
    }
}

impl AppConfig {
    /// Backing file for the event store, defaulting into `data_dir`.
    pub fn events_path(&self, data_dir: &Path) -> PathBuf {
        self.events_file
            .clone()
            .unwrap_or_else(|| data_dir.join(constants::EVENTS_FILE_NAME))
    }
}

/// Load and validate `config.toml` from the given config directory.
///
/// Returns `AppConfig` with validated values and a list of non-fatal warnings.
/// If the file does not exist, returns defaults with no warnings (first run).
/// If the file is unparseable, returns defaults with a warning so the
/// service still starts but the operator is informed.
pub fn load_config(config_dir: &Path) -> (AppConfig, Vec<String>) {
    let config_path = config_dir.join(constants::CONFIG_FILE_NAME);
    let mut warnings: Vec<String> = Vec::new();

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No config.toml found; using defaults");
        return (AppConfig::default(), warnings);
    }

    let raw = match read_raw_config(&config_path) {
        Ok(r) => r,
        Err(e) => {
            let msg = format!("{e}. Using defaults.");
            tracing::warn!("{}", msg);
            warnings.push(msg);
            return (AppConfig::default(), warnings);
        }
    };

    tracing::info!(path = %config_path.display(), "Loaded config.toml");
    let config = validate_raw(raw, &mut warnings);

    if !warnings.is_empty() {
        tracing::warn!(
            count = warnings.len(),
            "Config validation produced warnings"
        );
    }

    (config, warnings)
}

/// Read and parse a config file without validating its values.
pub fn read_raw_config(path: &Path) -> Result<RawConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::TomlParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Check that `value` lies in `min..=max`.
pub fn check_range<T>(field: &str, value: T, min: T, max: T) -> Result<T, ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value >= min && value <= max {
        Ok(value)
    } else {
        Err(ConfigError::ValueOutOfRange {
            field: field.to_string(),
            value: value.to_string(),
            expected: format!("{min}-{max}"),
        })
    }
}

/// Validate each field of a parsed config against named constants,
/// accumulating all problems rather than stopping at the first.
pub fn validate_raw(raw: RawConfig, warnings: &mut Vec<String>) -> AppConfig {
    let mut config = AppConfig::default();

    // -- Store: max_entries --
    if let Some(n) = raw.store.max_entries {
        match check_range(
            "store.max_entries",
            n,
            constants::MIN_MAX_ENTRIES,
            constants::ABSOLUTE_MAX_ENTRIES,
        ) {
            Ok(v) => config.max_entries = v,
            Err(e) => warnings.push(format!(
                "{e}. Using default ({}).",
                constants::DEFAULT_MAX_ENTRIES
            )),
        }
    }

    // -- Store: file --
    if let Some(file) = raw.store.file.filter(|f| !f.is_empty()) {
        config.events_file = Some(PathBuf::from(file));
    }

    // -- Store: trim_interval --
    if let Some(n) = raw.store.trim_interval {
        match check_range(
            "store.trim_interval",
            n,
            constants::MIN_TRIM_INTERVAL,
            constants::MAX_TRIM_INTERVAL,
        ) {
            Ok(v) => config.trim_interval = v,
            Err(e) => warnings.push(format!(
                "{e}. Using default ({}).",
                constants::DEFAULT_TRIM_INTERVAL
            )),
        }
    }

    // -- Source --
    config.container = raw.source.container.filter(|c| !c.is_empty());
    if let Some(label) = raw.source.label {
        config.container_label = if label.is_empty() { None } else { Some(label) };
    }
    if let Some(fallback) = raw.source.fallback_container {
        if fallback.is_empty() {
            warnings.push(format!(
                "[source] fallback_container must not be empty. Using default ({}).",
                constants::DEFAULT_FALLBACK_CONTAINER,
            ));
        } else {
            config.fallback_container = fallback;
        }
    }

    // -- Server: bind --
    if let Some(bind) = raw.server.bind {
        match bind.parse::<std::net::SocketAddr>() {
            Ok(_) => config.bind_addr = bind,
            Err(_) => warnings.push(format!(
                "[server] bind = \"{bind}\" is not a socket address (host:port). \
                 Using default ({}).",
                constants::DEFAULT_BIND_ADDR,
            )),
        }
    }

    // -- Server: subscriber_buffer --
    if let Some(n) = raw.server.subscriber_buffer {
        match check_range(
            "server.subscriber_buffer",
            n,
            constants::MIN_SUBSCRIBER_BUFFER,
            constants::MAX_SUBSCRIBER_BUFFER,
        ) {
            Ok(v) => config.subscriber_buffer = v,
            Err(e) => warnings.push(format!(
                "{e}. Using default ({}).",
                constants::DEFAULT_SUBSCRIBER_BUFFER
            )),
        }
    }

    // -- Server: keepalive_secs --
    if let Some(secs) = raw.server.keepalive_secs {
        match check_range(
            "server.keepalive_secs",
            secs,
            constants::MIN_KEEPALIVE_SECS,
            constants::MAX_KEEPALIVE_SECS,
        ) {
            Ok(v) => config.keepalive_secs = v,
            Err(e) => warnings.push(format!(
                "{e}. Using default ({}).",
                constants::DEFAULT_KEEPALIVE_SECS
            )),
        }
    }

    // -- Logging: level --
    if let Some(ref level) = raw.logging.level {
        let valid = ["error", "warn", "info", "debug", "trace"];
        if valid.contains(&level.to_lowercase().as_str()) {
            config.log_level = Some(level.clone());
        } else {
            warnings.push(format!(
                "[logging] level = \"{level}\" is not recognised. \
                 Valid values: error, warn, info, debug, trace. Using default (info).",
            ));
        }
    }

    // -- Logging: file --
    if let Some(ref file) = raw.logging.file {
        if !file.is_empty() {
            config.log_file = Some(file.clone());
        }
    }

    config
}

// =============================================================================
// Environment overrides
// =============================================================================

/// Apply `TUNNELWATCH_*` overrides from the process environment.
pub fn apply_env_overrides(config: &mut AppConfig) -> Vec<String> {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides using `lookup` to read variables (injectable for tests).
///
/// Invalid values are reported and ignored; the current value is kept.
pub fn apply_overrides_from(
    config: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Vec<String> {
    let mut warnings = Vec::new();
    let var = |name: &str| {
        lookup(&format!("{}{name}", constants::ENV_PREFIX))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    if let Some(v) = var("MAX_ENTRIES") {
        match v.parse::<usize>() {
            Ok(n) if (constants::MIN_MAX_ENTRIES..=constants::ABSOLUTE_MAX_ENTRIES)
                .contains(&n) =>
            {
                config.max_entries = n
            }
            _ => warnings.push(format!(
                "{}MAX_ENTRIES = \"{v}\" is not a number in range ({}-{}); ignored.",
                constants::ENV_PREFIX,
                constants::MIN_MAX_ENTRIES,
                constants::ABSOLUTE_MAX_ENTRIES,
            )),
        }
    }

    if let Some(v) = var("TRIM_INTERVAL") {
        match v.parse::<usize>() {
            Ok(n) if (constants::MIN_TRIM_INTERVAL..=constants::MAX_TRIM_INTERVAL)
                .contains(&n) =>
            {
                config.trim_interval = n
            }
            _ => warnings.push(format!(
                "{}TRIM_INTERVAL = \"{v}\" is not a number in range ({}-{}); ignored.",
                constants::ENV_PREFIX,
                constants::MIN_TRIM_INTERVAL,
                constants::MAX_TRIM_INTERVAL,
            )),
        }
    }

    if let Some(v) = var("EVENTS_FILE") {
        config.events_file = Some(PathBuf::from(v));
    }

    if let Some(v) = var("CONTAINER") {
        config.container = Some(v);
    }

    if let Some(v) = var("CONTAINER_LABEL") {
        config.container_label = Some(v);
    }

    if let Some(v) = var("BIND") {
        match v.parse::<std::net::SocketAddr>() {
            Ok(_) => config.bind_addr = v,
            Err(_) => warnings.push(format!(
                "{}BIND = \"{v}\" is not a socket address (host:port); ignored.",
                constants::ENV_PREFIX,
            )),
        }
    }

    for w in &warnings {
        tracing::warn!("{}", w);
    }
    warnings
}
