// TunnelWatch - util/error.rs
//
// Typed error hierarchy with context-preserving error chains.
// No string-based error propagation; every error keeps its causal chain
// for diagnostic logging.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Top-level error type for all TunnelWatch operations.
/// Errors are categorised by the subsystem that produced them.
#[derive(Debug)]
pub enum TunnelWatchError {
    /// Event store persistence failed.
    Store(StoreError),

    /// The monitored log source could not be attached or read.
    Source(SourceError),

    /// Configuration loading or validation failed.
    Config(ConfigError),

    /// The HTTP surface failed.
    Server(ServerError),
}

impl fmt::Display for TunnelWatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "Store error: {e}"),
            Self::Source(e) => write!(f, "Source error: {e}"),
            Self::Config(e) => write!(f, "Configuration error: {e}"),
            Self::Server(e) => write!(f, "Server error: {e}"),
        }
    }
}

impl std::error::Error for TunnelWatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Source(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Server(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

/// Errors related to the on-disk half of the event store.
#[derive(Debug)]
pub enum StoreError {
    /// I/O error with path and operation context.
    Io {
        path: PathBuf,
        operation: &'static str,
        source: io::Error,
    },

    /// An event could not be serialised to its JSON record.
    Serialize { source: serde_json::Error },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io {
                path,
                operation,
                source,
            } => write!(
                f,
                "I/O error during {operation} on '{}': {source}",
                path.display()
            ),
            Self::Serialize { source } => write!(f, "failed to serialise event: {source}"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Serialize { source } => Some(source),
        }
    }
}

impl From<StoreError> for TunnelWatchError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

// ---------------------------------------------------------------------------
// Source errors
// ---------------------------------------------------------------------------

/// Errors raised while attaching to or reading from the monitored process.
#[derive(Debug)]
pub enum SourceError {
    /// No candidate container could be located.
    NotFound { name: String },

    /// The runtime CLI could not be started.
    Spawn {
        program: &'static str,
        source: io::Error,
    },
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "Container {name} not found"),
            Self::Spawn { program, source } => write!(f, "failed to run '{program}': {source}"),
        }
    }
}

impl std::error::Error for SourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            Self::NotFound { .. } => None,
        }
    }
}

impl From<SourceError> for TunnelWatchError {
    fn from(e: SourceError) -> Self {
        Self::Source(e)
    }
}

// ---------------------------------------------------------------------------
// Config errors
// ---------------------------------------------------------------------------

/// Errors related to configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    /// TOML parsing failed.
    TomlParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A config value is out of the allowed range.
    ValueOutOfRange {
        field: String,
        value: String,
        expected: String,
    },

    /// I/O error reading config file.
    Io { path: PathBuf, source: io::Error },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TomlParse { path, source } => {
                write!(f, "Config parse error '{}': {source}", path.display())
            }
            Self::ValueOutOfRange {
                field,
                value,
                expected,
            } => write!(
                f,
                "Config '{field}' = '{value}' is out of range. Expected: {expected}"
            ),
            Self::Io { path, source } => {
                write!(f, "Config I/O error '{}': {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::TomlParse { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<ConfigError> for TunnelWatchError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Server errors
// ---------------------------------------------------------------------------

/// Errors related to the HTTP surface.
#[derive(Debug)]
pub enum ServerError {
    /// The listen socket could not be bound.
    Bind { addr: String, source: io::Error },

    /// The server stopped accepting connections.
    Serve { source: io::Error },
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind { addr, source } => write!(f, "cannot bind '{addr}': {source}"),
            Self::Serve { source } => write!(f, "HTTP server failed: {source}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Bind { source, .. } => Some(source),
            Self::Serve { source } => Some(source),
        }
    }
}

impl From<ServerError> for TunnelWatchError {
    fn from(e: ServerError) -> Self {
        Self::Server(e)
    }
}

/// Convenience type alias for TunnelWatch results.
pub type Result<T> = std::result::Result<T, TunnelWatchError>;
