// TunnelWatch - tests/e2e_server.rs
//
// End-to-end tests for the HTTP surface.
//
// Each test binds a real server on an ephemeral loopback port, backed by a
// real on-disk event store and a scripted log source fed through a channel,
// and talks to it with a blocking HTTP client.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tunnelwatch::app::store::{EventStore, StoreConfig};
use tunnelwatch::app::stream::{LineStream, LogSource, NextLine, StreamHub};
use tunnelwatch::util::error::SourceError;
use tunnelwatch::web::{Server, WebState};

// =============================================================================
// Harness
// =============================================================================

/// Source whose lines are pushed by the test through a channel.
struct ChannelSource {
    lines: Receiver<String>,
}

struct ChannelStream {
    lines: Receiver<String>,
}

impl LineStream for ChannelStream {
    fn next_line(&mut self, wait: Duration) -> NextLine {
        match self.lines.recv_timeout(wait) {
            Ok(line) => NextLine::Line(line),
            Err(RecvTimeoutError::Timeout) => NextLine::Idle,
            Err(RecvTimeoutError::Disconnected) => NextLine::Ended,
        }
    }
}

impl LogSource for ChannelSource {
    fn follow(&self) -> Result<Box<dyn LineStream>, SourceError> {
        Ok(Box::new(ChannelStream {
            lines: self.lines.clone(),
        }))
    }
}

/// Source that can never be attached to.
struct AbsentSource;

impl LogSource for AbsentSource {
    fn follow(&self) -> Result<Box<dyn LineStream>, SourceError> {
        Err(SourceError::NotFound {
            name: "cloudflared-tunnel".to_string(),
        })
    }
}

struct Harness {
    addr: SocketAddr,
    store: Arc<EventStore>,
    events_file: PathBuf,
    lines: Sender<String>,
    _dir: TempDir,
}

impl Harness {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

fn start(source: Option<Arc<dyn LogSource>>) -> Harness {
    let dir = TempDir::new().unwrap();
    let events_file = dir.path().join("events.jsonl");
    let store = Arc::new(EventStore::open(StoreConfig::with_path(&events_file)));

    let (tx, rx) = crossbeam_channel::unbounded();
    let source = source.unwrap_or_else(|| Arc::new(ChannelSource { lines: rx }));
    let hub = StreamHub::new(source, store.clone(), 64);

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let server = runtime
        .block_on(Server::bind(
            "127.0.0.1:0",
            WebState {
                store: store.clone(),
                hub,
                keepalive: Duration::from_millis(200),
            },
        ))
        .unwrap();
    let addr = server.local_addr().unwrap();
    std::thread::spawn(move || runtime.block_on(server.serve()));

    Harness {
        addr,
        store,
        events_file,
        lines: tx,
        _dir: dir,
    }
}

fn client() -> reqwest::blocking::Client {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Read SSE lines until `count` data frames arrived; returns their JSON.
fn read_frames<R: Read>(reader: &mut BufReader<R>, count: usize) -> Vec<serde_json::Value> {
    let mut frames = Vec::new();
    let mut line = String::new();
    while frames.len() < count {
        line.clear();
        let n = reader.read_line(&mut line).unwrap();
        assert!(n > 0, "stream closed after {} frames", frames.len());
        if let Some(json) = line.trim_end().strip_prefix("data:") {
            frames.push(serde_json::from_str(json.trim_start()).unwrap());
        }
    }
    frames
}

const REQUEST_LINE: &str = "2024-02-04T10:30:45Z INF GET /api/data host=api.example.com \
                            status=404 ingressRule=2 originService=http://localhost:8000";
const CONNECT_LINE: &str = "2024-02-04T10:30:46Z INF Connection abc registered connIndex=0";

// =============================================================================
// History / clear / health
// =============================================================================

#[test]
fn e2e_history_starts_empty() {
    let h = start(None);
    let resp = client().get(h.url("/history")).send().unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().unwrap();
    assert_eq!(body, serde_json::json!({ "logs": [] }));
}

#[test]
fn e2e_clear_is_idempotent() {
    let h = start(None);
    let http = client();

    for _ in 0..2 {
        let resp = http.post(h.url("/clear")).send().unwrap();
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().unwrap();
        assert_eq!(body, serde_json::json!({ "success": true }));
    }
    assert!(h.store.is_empty());
    assert_eq!(std::fs::read_to_string(&h.events_file).unwrap(), "");
}

#[test]
fn e2e_clear_accepts_request_body() {
    let h = start(None);
    let http = client();
    let body = vec![b'x'; 64 * 1024];

    for _ in 0..3 {
        let resp = http.post(h.url("/clear")).body(body.clone()).send().unwrap();
        assert_eq!(resp.status(), 200);
        let reply: serde_json::Value = resp.json().unwrap();
        assert_eq!(reply, serde_json::json!({ "success": true }));
    }
}

#[test]
fn e2e_health_reports_retained_count() {
    let h = start(None);
    let body: serde_json::Value = client()
        .get(h.url("/health"))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["retained"], 0);
}

// =============================================================================
// Routing errors
// =============================================================================

#[test]
fn e2e_unknown_path_is_404() {
    let h = start(None);
    let resp = client().get(h.url("/nope")).send().unwrap();
    assert_eq!(resp.status(), 404);
}

#[test]
fn e2e_wrong_method_is_405() {
    let h = start(None);
    let http = client();
    assert_eq!(http.get(h.url("/clear")).send().unwrap().status(), 405);
    assert_eq!(http.delete(h.url("/history")).send().unwrap().status(), 405);
}

#[test]
fn e2e_garbage_request_is_400() {
    let h = start(None);
    let mut conn = TcpStream::connect(h.addr).unwrap();
    conn.write_all(b"not http at all\r\n\r\n").unwrap();
    let mut response = String::new();
    conn.read_to_string(&mut response).unwrap();
    assert!(
        response.starts_with("HTTP/1.1 400"),
        "unexpected response: {response}"
    );
}

// =============================================================================
// Live stream
// =============================================================================

#[test]
fn e2e_stream_delivers_classified_events_and_persists_them() {
    let h = start(None);
    let resp = client().get(h.url("/stream")).send().unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    assert_eq!(resp.headers()["cache-control"].to_str().unwrap(), "no-cache");

    h.lines.send(REQUEST_LINE.to_string()).unwrap();
    h.lines.send("just some noise".to_string()).unwrap();
    h.lines.send(CONNECT_LINE.to_string()).unwrap();

    let mut reader = BufReader::new(resp);
    let frames = read_frames(&mut reader, 2);

    assert_eq!(frames[0]["type"], "request");
    assert_eq!(frames[0]["method"], "GET");
    assert_eq!(frames[0]["path"], "/api/data");
    assert_eq!(frames[0]["status"], 404);
    assert_eq!(frames[0]["ingressRule"], 2);
    assert_eq!(frames[0]["originService"], "http://localhost:8000");
    assert_eq!(frames[1]["type"], "connection");
    assert_eq!(frames[1]["message"], "Tunnel connected");

    // Both events were committed once; history is newest first.
    let body: serde_json::Value = client()
        .get(h.url("/history"))
        .send()
        .unwrap()
        .json()
        .unwrap();
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["type"], "connection");
    assert_eq!(logs[1]["type"], "request");

    let on_disk = std::fs::read_to_string(&h.events_file).unwrap();
    assert_eq!(on_disk.lines().count(), 2);
}

#[test]
fn e2e_two_viewers_share_one_event() {
    let h = start(None);
    let http = client();
    let first = http.get(h.url("/stream")).send().unwrap();
    let second = http.get(h.url("/stream")).send().unwrap();

    h.lines.send(CONNECT_LINE.to_string()).unwrap();

    let a = read_frames(&mut BufReader::new(first), 1);
    let b = read_frames(&mut BufReader::new(second), 1);
    assert_eq!(a, b);
    assert_eq!(h.store.len(), 1, "event must be persisted once");
}

#[test]
fn e2e_idle_stream_sends_keepalive() {
    let h = start(None);
    let resp = client().get(h.url("/stream")).send().unwrap();
    let mut reader = BufReader::new(resp);
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert!(
        line.starts_with(':') && line.contains("keep-alive"),
        "unexpected first line: {line:?}"
    );
}

#[test]
fn e2e_missing_container_reports_and_closes() {
    let h = start(Some(Arc::new(AbsentSource)));
    let resp = client().get(h.url("/stream")).send().unwrap();
    let mut reader = BufReader::new(resp);
    let frames = read_frames(&mut reader, 1);

    assert_eq!(frames[0]["type"], "log");
    assert_eq!(frames[0]["level"], "error");
    assert_eq!(frames[0]["message"], "Container cloudflared-tunnel not found");

    let mut rest = String::new();
    reader.read_to_string(&mut rest).unwrap();
    assert!(!rest.contains("data:"), "no further events expected");
    assert_eq!(h.store.len(), 1);
}
