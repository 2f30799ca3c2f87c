// TunnelWatch - core/parser.rs
//
// Line classifier: raw container log line -> typed `LogEvent` or nothing.
// Core layer: pure logic over `&str`, never touches I/O and never fails.
// A line that cannot be understood degrades to `None` (dropped) or to a
// lower-fidelity event; it never aborts the stream.
//
// Classification order (first match wins):
//   1. timestamp extraction (always; falls back to wall-clock time)
//   2. HTTP request         -> RequestEvent
//   3. connection change    -> ConnectionEvent (only for recognised sub-cases)
//   4. error marker         -> GenericLogEvent { level: error }
//   5. warning marker       -> GenericLogEvent { level: warning }
//   6. otherwise            -> None

use crate::core::headers::extract_headers;
use crate::core::model::{
    wall_clock_timestamp, ConnectionEvent, ConnectionLevel, GenericLogEvent, LogEvent, LogLevel,
    RequestEvent,
};
use crate::util::constants::{
    DEBUG_MAX_LINE_PREVIEW, DEFAULT_REQUEST_STATUS, ELLIPSIS, MAX_MESSAGE_CHARS,
    UNKNOWN_FIELD, UNKNOWN_INGRESS_RULE,
};
use chrono::{DateTime, Local};
use regex::Regex;
use std::sync::OnceLock;

/// Marker that introduces the embedded header object.
const HEADERS_MARKER: &str = "headers=";

// =============================================================================
// Compiled patterns
// =============================================================================

/// All regexes used by the classifier, compiled once per process.
struct Patterns {
    timestamp: Regex,
    request: Regex,
    host: Regex,
    status: Regex,
    ingress_rule: Regex,
    origin_service: Regex,
    error_prefix: Regex,
    warning_prefix: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // Patterns are constant and covered by the unit tests below, so a
        // mistake shows up as a failing test rather than a runtime panic.
        fn re(pat: &str) -> Regex {
            Regex::new(pat).expect("classifier: invalid regex")
        }

        Patterns {
            timestamp: re(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}"),
            // The method must be a standalone token (so `TARGET /x` is not a
            // request) followed by whitespace and a non-whitespace path.
            request: re(r"\b(GET|POST|PUT|DELETE|PATCH|HEAD|OPTIONS)\s+(\S+)"),
            host: re(r"host=(\S+)"),
            status: re(r"status=(\d+)"),
            ingress_rule: re(r"ingressRule=(\d+)"),
            origin_service: re(r"originService=(\S+)"),
            // Longest alternatives first: the regex engine is leftmost-first,
            // so `ERR` listed before `ERROR` would leave a dangling "OR".
            error_prefix: re(
                r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z?\s+(?:ERROR|ERR)?\s*",
            ),
            warning_prefix: re(
                r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z?\s+(?:WARNING|WARN|WRN)?\s*",
            ),
        }
    })
}

// =============================================================================
// Public API
// =============================================================================

/// Classify a single log line, using the current wall-clock time as the
/// fallback timestamp.
pub fn classify(line: &str) -> Option<LogEvent> {
    classify_at(line, Local::now())
}

/// Classify a single log line with an explicit "now" for lines that carry no
/// timestamp of their own. Deterministic for a fixed `now`.
pub fn classify_at(line: &str, now: DateTime<Local>) -> Option<LogEvent> {
    let p = patterns();

    let timestamp = p
        .timestamp
        .find(line)
        .map(|m| m.as_str().to_string())
        .unwrap_or_else(|| wall_clock_timestamp(now));

    if let Some(request) = classify_request(line, &timestamp, p) {
        return Some(LogEvent::Request(request));
    }

    let lower = line.to_lowercase();

    if let Some(connection) = classify_connection(line, &lower, &timestamp) {
        return Some(LogEvent::Connection(connection));
    }

    // A connection-gated line without a recognised sub-case falls through to
    // the error/warning checks against the unmodified line.
    if line.contains("ERR") || lower.contains("error") {
        return Some(LogEvent::Log(GenericLogEvent {
            timestamp,
            message: clean_message(line, &p.error_prefix),
            level: LogLevel::Error,
        }));
    }

    if line.contains("WRN") || lower.contains("warning") {
        return Some(LogEvent::Log(GenericLogEvent {
            timestamp,
            message: clean_message(line, &p.warning_prefix),
            level: LogLevel::Warning,
        }));
    }

    None
}

/// Cap `message` at `MAX_MESSAGE_CHARS` characters, appending `ELLIPSIS`
/// when anything was cut. Counts characters, not bytes, so multi-byte text
/// is never split mid-codepoint.
pub fn truncate_message(message: &str) -> String {
    match message.char_indices().nth(MAX_MESSAGE_CHARS) {
        Some((cut, _)) => {
            let mut out = String::with_capacity(cut + ELLIPSIS.len());
            out.push_str(&message[..cut]);
            out.push_str(ELLIPSIS);
            out
        }
        None => message.to_string(),
    }
}

// =============================================================================
// Stages
// =============================================================================

fn classify_request(line: &str, timestamp: &str, p: &Patterns) -> Option<RequestEvent> {
    let caps = p.request.captures(line)?;
    let method = caps.get(1)?.as_str().to_string();
    let path = caps.get(2)?.as_str().to_string();

    let host = capture(&p.host, line).unwrap_or(UNKNOWN_FIELD).to_string();
    let origin_service = capture(&p.origin_service, line)
        .unwrap_or(UNKNOWN_FIELD)
        .to_string();

    // Digits that overflow the target type are treated like an absent key.
    let status = capture(&p.status, line)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(DEFAULT_REQUEST_STATUS);
    let ingress_rule = capture(&p.ingress_rule, line)
        .and_then(|s| s.parse::<i32>().ok())
        .unwrap_or(UNKNOWN_INGRESS_RULE);

    let headers = line.find(HEADERS_MARKER).and_then(|idx| {
        let extracted = extract_headers(line, idx + HEADERS_MARKER.len());
        if extracted.is_none() {
            tracing::debug!(
                line = %preview(line),
                "Request line has a headers marker but no usable header object"
            );
        }
        extracted
    });

    Some(RequestEvent {
        timestamp: timestamp.to_string(),
        method,
        path,
        host,
        status,
        ingress_rule,
        origin_service,
        headers,
    })
}

/// First capture group of `re` in `line`, if any.
fn capture<'a>(re: &Regex, line: &'a str) -> Option<&'a str> {
    re.captures(line).and_then(|c| c.get(1)).map(|m| m.as_str())
}

fn classify_connection(line: &str, lower: &str, timestamp: &str) -> Option<ConnectionEvent> {
    if !(line.contains("Connection") || lower.contains("connected")) {
        return None;
    }

    let (message, level) = if lower.contains("registered") || lower.contains("established") {
        ("Tunnel connected", ConnectionLevel::Success)
    } else if lower.contains("disconnected") || lower.contains("closed") {
        ("Tunnel disconnected", ConnectionLevel::Error)
    } else {
        return None;
    };

    Some(ConnectionEvent {
        timestamp: timestamp.to_string(),
        message: message.to_string(),
        level,
    })
}

/// Strip a leading `timestamp LEVEL` prefix (already captured elsewhere in
/// the event) and cap the remainder.
fn clean_message(line: &str, prefix: &Regex) -> String {
    let stripped = match prefix.find(line) {
        Some(m) => &line[m.end()..],
        None => line,
    };
    truncate_message(stripped)
}

fn preview(line: &str) -> &str {
    match line.char_indices().nth(DEBUG_MAX_LINE_PREVIEW) {
        Some((cut, _)) => &line[..cut],
        None => line,
    }
}

// =============================================================================
// Unit tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()
    }

    fn classify_fixed(line: &str) -> Option<LogEvent> {
        classify_at(line, fixed_now())
    }

    fn expect_request(line: &str) -> RequestEvent {
        match classify_fixed(line) {
            Some(LogEvent::Request(r)) => r,
            other => panic!("expected request for {line:?}, got {other:?}"),
        }
    }

    fn expect_log(line: &str) -> GenericLogEvent {
        match classify_fixed(line) {
            Some(LogEvent::Log(l)) => l,
            other => panic!("expected generic log for {line:?}, got {other:?}"),
        }
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    #[test]
    fn test_full_request_line() {
        let line = "2024-02-04T10:30:45Z INF GET /api/data host=api.example.com status=404 \
                    ingressRule=2 originService=http://localhost:8000";
        let r = expect_request(line);
        assert_eq!(
            r,
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
        );
    }

    #[test]
    fn test_request_defaults_when_keys_absent() {
        let r = expect_request("POST /submit");
        assert_eq!(r.method, "POST");
        assert_eq!(r.path, "/submit");
        assert_eq!(r.status, 200);
        assert_eq!(r.ingress_rule, -1);
        assert_eq!(r.host, "unknown");
        assert_eq!(r.origin_service, "unknown");
        assert_eq!(r.timestamp, "2025-06-01T08:00:00.000000");
    }

    #[test]
    fn test_every_method_is_recognised() {
        for method in ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"] {
            let r = expect_request(&format!("{method} /x"));
            assert_eq!(r.method, method);
        }
    }

    #[test]
    fn test_method_must_be_a_token() {
        assert!(classify_fixed("TARGET /x reached").is_none());
        assert!(classify_fixed("GETTING ready").is_none());
    }

    #[test]
    fn test_oversized_status_falls_back_to_default() {
        assert_eq!(expect_request("GET / status=999999").status, 200);
    }

    #[test]
    fn test_request_headers_first_element() {
        let line = r#"2024-02-04T10:30:45Z INF GET / host=a headers={"X":["a","b"]}"#;
        let headers = expect_request(line).headers.unwrap();
        assert_eq!(headers["X"], "a");
    }

    #[test]
    fn test_malformed_headers_still_yield_request() {
        for line in [
            r#"GET /x headers={"X":["a""#,
            r#"GET /x headers={bad json} status=500"#,
            "GET /x headers=",
        ] {
            let r = expect_request(line);
            assert!(r.headers.is_none(), "headers must be omitted for {line:?}");
        }
        assert_eq!(expect_request(r#"GET /x headers={bad json} status=500"#).status, 500);
    }

    /// A request mentioning "error" in a header stays a request.
    #[test]
    fn test_request_takes_priority_over_error() {
        let line = r#"ERR GET /fail headers={"X-Error":["error"]}"#;
        let r = expect_request(line);
        assert_eq!(r.headers.unwrap()["X-Error"], "error");
    }

    // -------------------------------------------------------------------------
    // Connections
    // -------------------------------------------------------------------------

    #[test]
    fn test_connection_registered() {
        let line = "2024-02-04T10:30:45Z INF Connection abc registered connIndex=0";
        match classify_fixed(line) {
            Some(LogEvent::Connection(c)) => {
                assert_eq!(c.message, "Tunnel connected");
                assert_eq!(c.level, ConnectionLevel::Success);
                assert_eq!(c.timestamp, "2024-02-04T10:30:45");
            }
            other => panic!("expected connection, got {other:?}"),
        }
    }

    #[test]
    fn test_connection_established_case_insensitive() {
        match classify_fixed("tunnel connected: ESTABLISHED") {
            Some(LogEvent::Connection(c)) => assert_eq!(c.level, ConnectionLevel::Success),
            other => panic!("expected connection, got {other:?}"),
        }
    }

    #[test]
    fn test_connection_disconnected() {
        match classify_fixed("INF Connection closed by peer") {
            Some(LogEvent::Connection(c)) => {
                assert_eq!(c.message, "Tunnel disconnected");
                assert_eq!(c.level, ConnectionLevel::Error);
            }
            other => panic!("expected connection, got {other:?}"),
        }
        // "disconnected" itself passes the outer "connected" gate.
        assert!(matches!(
            classify_fixed("edge disconnected"),
            Some(LogEvent::Connection(_))
        ));
    }

    /// Gate matched but no sub-case: the error check still runs.
    #[test]
    fn test_connection_gate_falls_through_to_error() {
        let l = expect_log("2024-02-04T10:30:45Z ERR Connection reset unexpectedly");
        assert_eq!(l.level, LogLevel::Error);
        assert_eq!(l.message, "Connection reset unexpectedly");
    }

    #[test]
    fn test_connection_gate_falls_through_to_warning() {
        let l = expect_log("Connection pool warning");
        assert_eq!(l.level, LogLevel::Warning);
        assert_eq!(l.message, "Connection pool warning");
    }

    #[test]
    fn test_connection_gate_without_markers_is_dropped() {
        assert!(classify_fixed("Connection pool size 4").is_none());
    }

    // -------------------------------------------------------------------------
    // Errors and warnings
    // -------------------------------------------------------------------------

    #[test]
    fn test_error_prefix_stripped() {
        let l = expect_log("2024-02-04T10:30:45Z ERR failed to serve tunnel");
        assert_eq!(l.level, LogLevel::Error);
        assert_eq!(l.message, "failed to serve tunnel");
        assert_eq!(l.timestamp, "2024-02-04T10:30:45");
    }

    #[test]
    fn test_error_long_prefix_stripped_whole() {
        let l = expect_log("2024-02-04T10:30:45Z ERROR boom");
        assert_eq!(l.message, "boom");
    }

    #[test]
    fn test_error_case_insensitive_without_prefix() {
        let l = expect_log("an Error occurred");
        assert_eq!(l.message, "an Error occurred");
        assert_eq!(l.timestamp, "2025-06-01T08:00:00.000000");
    }

    #[test]
    fn test_warning_prefix_stripped() {
        let l = expect_log("2024-02-04T10:30:45Z WRN retrying in 2s");
        assert_eq!(l.level, LogLevel::Warning);
        assert_eq!(l.message, "retrying in 2s");

        let l = expect_log("2024-02-04T10:30:45Z WARNING disk low");
        assert_eq!(l.message, "disk low");
    }

    #[test]
    fn test_error_wins_over_warning() {
        assert_eq!(expect_log("WRN error budget exceeded").level, LogLevel::Error);
    }

    #[test]
    fn test_truncation_boundary() {
        let exact = "e".repeat(150);
        assert_eq!(truncate_message(&exact), exact);

        let over = "e".repeat(151);
        let cut = truncate_message(&over);
        assert_eq!(cut, format!("{}...", "e".repeat(150)));

        let l = expect_log(&format!("ERR {}", "x".repeat(200)));
        assert_eq!(l.message.chars().count(), 153);
        assert!(l.message.ends_with("..."));
    }

    #[test]
    fn test_truncation_counts_characters() {
        let text = "é".repeat(151);
        let cut = truncate_message(&text);
        assert_eq!(cut.chars().count(), 153);
    }

    // -------------------------------------------------------------------------
    // No match
    // -------------------------------------------------------------------------

    #[test]
    fn test_unremarkable_line_is_dropped() {
        assert!(classify_fixed("INF Starting metrics server on 127.0.0.1:2000").is_none());
        assert!(classify_fixed("").is_none());
    }

    #[test]
    fn test_timestamp_found_anywhere() {
        let l = expect_log("[edge] at 2023-12-31T23:59:59 ERR x");
        assert_eq!(l.timestamp, "2023-12-31T23:59:59");
    }
}
