// TunnelWatch - core/model.rs
//
// Core data model types. Pure data definitions with no I/O and no platform
// dependencies.
//
// `LogEvent` is the unit that flows through the whole pipeline: produced by
// the classifier, retained by the store, serialised to viewers. It is a sum
// type so every consumer matches exhaustively on the three kinds.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// LogEvent
// =============================================================================

/// One classified unit emitted by the pipeline.
///
/// Serialised with an internal `type` tag (`request`, `connection`, `log`)
/// so a JSON record is self-describing both on the wire and on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LogEvent {
    Request(RequestEvent),
    Connection(ConnectionEvent),
    Log(GenericLogEvent),
}

impl LogEvent {
    /// Timestamp string carried by every variant.
    pub fn timestamp(&self) -> &str {
        match self {
            LogEvent::Request(e) => &e.timestamp,
            LogEvent::Connection(e) => &e.timestamp,
            LogEvent::Log(e) => &e.timestamp,
        }
    }

    /// Short kind label, matching the serialised `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            LogEvent::Request(_) => "request",
            LogEvent::Connection(_) => "connection",
            LogEvent::Log(_) => "log",
        }
    }

    /// Synthesise an error-level generic event stamped with the current time.
    ///
    /// Used by the stream when the source cannot be attached or fails
    /// mid-read. The message is stored verbatim (not truncated) because it
    /// is produced locally, not taken from the monitored process.
    pub fn failure(message: impl Into<String>) -> Self {
        LogEvent::Log(GenericLogEvent {
            timestamp: wall_clock_timestamp(Local::now()),
            message: message.into(),
            level: LogLevel::Error,
        })
    }
}

// =============================================================================
// Variants
// =============================================================================

/// An HTTP request that passed through the tunnel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEvent {
    pub timestamp: String,
    pub method: String,
    pub path: String,
    pub host: String,
    /// HTTP status; 200 when the line carried none.
    pub status: u16,
    /// Index of the matched ingress rule; -1 when unknown.
    pub ingress_rule: i32,
    pub origin_service: String,
    /// Request headers, each value collapsed to a single string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

/// Tunnel connectivity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub timestamp: String,
    pub message: String,
    pub level: ConnectionLevel,
}

/// A generic error or warning line (message capped at 150 chars + "...").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericLogEvent {
    pub timestamp: String,
    pub message: String,
    pub level: LogLevel,
}

// =============================================================================
// Levels
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warning,
}

impl LogLevel {
    pub fn label(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// =============================================================================
// Timestamps
// =============================================================================

/// Render a wall-clock instant in the fallback timestamp form
/// `YYYY-MM-DDTHH:MM:SS.ffffff` (local time, no offset).
pub fn wall_clock_timestamp(now: DateTime<Local>) -> String {
    now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn request() -> RequestEvent {
        RequestEvent {
            timestamp: "2024-02-04T10:30:45".to_string(),
            method: "GET".to_string(),
            path: "/api/data".to_string(),
            host: "api.example.com".to_string(),
            status: 404,
            ingress_rule: 2,
            origin_service: "http://localhost:8000".to_string(),
            headers: None,
        }
    }

    /// The JSON record uses the `type` tag and camelCase request fields.
    #[test]
    fn test_request_json_shape() {
        let value = serde_json::to_value(LogEvent::Request(request())).unwrap();
        assert_eq!(value["type"], "request");
        assert_eq!(value["ingressRule"], 2);
        assert_eq!(value["originService"], "http://localhost:8000");
        assert_eq!(value["status"], 404);
        assert!(
            value.get("headers").is_none(),
            "absent headers must be omitted, not serialised as null"
        );
    }

    #[test]
    fn test_levels_serialise_lowercase() {
        let event = LogEvent::Connection(ConnectionEvent {
            timestamp: "t".to_string(),
            message: "Tunnel connected".to_string(),
            level: ConnectionLevel::Success,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"connection""#));
        assert!(json.contains(r#""level":"success""#));

        let warn = serde_json::to_value(LogEvent::Log(GenericLogEvent {
            timestamp: "t".to_string(),
            message: "m".to_string(),
            level: LogLevel::Warning,
        }))
        .unwrap();
        assert_eq!(warn["type"], "log");
        assert_eq!(warn["level"], "warning");
    }

    /// A persisted record must decode back into the same variant.
    #[test]
    fn test_record_decodes_to_variant() {
        let mut req = request();
        req.headers = Some(BTreeMap::from([(
            "User-Agent".to_string(),
            "curl/8.0".to_string(),
        )]));
        let line = serde_json::to_string(&LogEvent::Request(req.clone())).unwrap();
        let decoded: LogEvent = serde_json::from_str(&line).unwrap();
        assert_eq!(decoded, LogEvent::Request(req));
    }

    #[test]
    fn test_failure_event_is_error_log() {
        match LogEvent::failure("Container x not found") {
            LogEvent::Log(e) => {
                assert_eq!(e.level, LogLevel::Error);
                assert_eq!(e.message, "Container x not found");
                assert!(!e.timestamp.is_empty());
            }
            other => panic!("expected log event, got {other:?}"),
        }
    }

    #[test]
    fn test_wall_clock_timestamp_format() {
        let now = Local.with_ymd_and_hms(2024, 2, 4, 10, 30, 45).unwrap();
        assert_eq!(wall_clock_timestamp(now), "2024-02-04T10:30:45.000000");
    }
}
