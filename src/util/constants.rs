// TunnelWatch - util/constants.rs
//
// Single source of truth for all named constants, limits, and defaults.
// Every bound on a growing collection or a configurable value lives here.

// =============================================================================
// Application metadata
// =============================================================================

/// Application display name.
pub const APP_NAME: &str = "TunnelWatch";

/// Application identifier used for config/data directories.
pub const APP_ID: &str = "TunnelWatch";

/// Current application version (updated by release script).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prefix for all environment-variable overrides.
pub const ENV_PREFIX: &str = "TUNNELWATCH_";

// =============================================================================
// Classifier limits
// =============================================================================

/// Maximum number of characters kept from a generic error/warning message.
/// Longer messages are cut to this length and suffixed with `ELLIPSIS`.
pub const MAX_MESSAGE_CHARS: usize = 150;

/// Marker appended to a truncated message.
pub const ELLIPSIS: &str = "...";

/// Value used for `status` when a request line carries no `status=` token.
pub const DEFAULT_REQUEST_STATUS: u16 = 200;

/// Sentinel used for `ingressRule` when a request line carries no
/// `ingressRule=` token.
pub const UNKNOWN_INGRESS_RULE: i32 = -1;

/// Placeholder for `host` / `originService` when the token is absent.
pub const UNKNOWN_FIELD: &str = "unknown";

/// Maximum length of a log line included in debug output.
pub const DEBUG_MAX_LINE_PREVIEW: usize = 200;

// =============================================================================
// Event store
// =============================================================================

/// Default number of events retained in memory and on disk.
pub const DEFAULT_MAX_ENTRIES: usize = 500;

/// Minimum user-configurable retention (a zero-capacity store is useless).
pub const MIN_MAX_ENTRIES: usize = 1;

/// Hard upper bound on retention (prevents configuration mistakes).
pub const ABSOLUTE_MAX_ENTRIES: usize = 100_000;

/// Default number of appends between two trims of the backing file.
pub const DEFAULT_TRIM_INTERVAL: usize = 100;

/// Minimum user-configurable trim interval.
pub const MIN_TRIM_INTERVAL: usize = 1;

/// Maximum user-configurable trim interval.
pub const MAX_TRIM_INTERVAL: usize = 1_000_000;

/// Backing file name (stored in the platform data directory).
pub const EVENTS_FILE_NAME: &str = "events.jsonl";

// =============================================================================
// Log source
// =============================================================================

/// Container followed when neither an explicit name nor a label match resolves.
pub const DEFAULT_FALLBACK_CONTAINER: &str = "cloudflared-tunnel";

/// Orchestration label used to discover the tunnel container.
pub const DEFAULT_CONTAINER_LABEL: &str = "com.docker.compose.service=cloudflared";

/// Container runtime CLI used to resolve and follow the container.
pub const DOCKER_PROGRAM: &str = "docker";

// =============================================================================
// Web surface
// =============================================================================

/// Default listen address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Events buffered per connected viewer before new events are dropped for
/// that viewer only.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 256;

/// Minimum / maximum configurable per-viewer buffer.
pub const MIN_SUBSCRIBER_BUFFER: usize = 1;
pub const MAX_SUBSCRIBER_BUFFER: usize = 65_536;

/// Idle seconds before an SSE keep-alive comment frame is written.
pub const DEFAULT_KEEPALIVE_SECS: u64 = 15;

/// Minimum / maximum configurable keep-alive interval (seconds).
pub const MIN_KEEPALIVE_SECS: u64 = 1;
pub const MAX_KEEPALIVE_SECS: u64 = 3_600;

/// How long the stream pump waits for a source line before checking
/// whether any viewer is still attached.
pub const PUMP_IDLE_CHECK_MS: u64 = 250;

// =============================================================================
// Logging
// =============================================================================

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// =============================================================================
// Configuration
// =============================================================================

/// Configuration file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";
