// TunnelWatch - platform/docker.rs
//
// Container log source backed by the `docker` CLI.
//
// Resolution order (first hit wins):
//   1. explicit container name override
//   2. first running container carrying the configured label
//   3. hard-coded fallback name
// No hit is `SourceError::NotFound`.
//
// Following runs `docker logs --follow --tail 0 <name>`, so only lines
// written after attachment are seen. The tunnel daemon logs to stderr, so
// both pipes are read on their own threads and merged into one channel.
// Dropping the stream kills the child process.

use crate::app::stream::{LineStream, LogSource, NextLine};
use crate::util::constants::{
    DEFAULT_CONTAINER_LABEL, DEFAULT_FALLBACK_CONTAINER, DOCKER_PROGRAM,
};
use crate::util::error::SourceError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::io::{self, BufRead, BufReader, Read};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

/// Lines buffered between the pipe readers and the pump.
const LINE_CHANNEL_CAPACITY: usize = 1_024;

// =============================================================================
// Configuration
// =============================================================================

/// Which container to follow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Explicit container name; tried first when set.
    pub container: Option<String>,
    /// `key=value` label used to discover the container; `None` disables.
    pub label: Option<String>,
    /// Name tried last.
    pub fallback: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            container: None,
            label: Some(DEFAULT_CONTAINER_LABEL.to_string()),
            fallback: DEFAULT_FALLBACK_CONTAINER.to_string(),
        }
    }
}

// =============================================================================
// Resolution
// =============================================================================

/// Queries the container runtime about candidate containers.
pub trait ContainerLookup {
    /// Whether a container with this exact name exists.
    fn exists(&self, name: &str) -> Result<bool, SourceError>;
    /// Name of the first container (any state) carrying `label`, if any.
    fn find_by_label(&self, label: &str) -> Result<Option<String>, SourceError>;
}

/// Pick the container to follow according to the resolution order.
pub fn resolve_container(
    config: &SourceConfig,
    lookup: &dyn ContainerLookup,
) -> Result<String, SourceError> {
    if let Some(name) = config.container.as_deref().filter(|n| !n.is_empty()) {
        if lookup.exists(name)? {
            return Ok(name.to_string());
        }
        tracing::debug!(container = name, "Configured container not found");
    }

    if let Some(label) = config.label.as_deref().filter(|l| !l.is_empty()) {
        if let Some(name) = lookup.find_by_label(label)? {
            tracing::debug!(container = %name, label, "Container resolved by label");
            return Ok(name);
        }
    }

    if lookup.exists(&config.fallback)? {
        return Ok(config.fallback.clone());
    }

    let name = config
        .container
        .clone()
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| config.fallback.clone());
    Err(SourceError::NotFound { name })
}

/// `docker` arguments listing containers in any state, running or not, that carry `label`.
fn label_query_args(label: &str) -> Vec<String> {
    vec![
        "ps".to_string(),
        "-a".to_string(),
        "--filter".to_string(),
        format!("label={label}"),
        "--format".to_string(),
        "{{.Names}}".to_string(),
    ]
}

/// `ContainerLookup` that shells out to the docker CLI.
pub struct DockerCli;

impl ContainerLookup for DockerCli {
    fn exists(&self, name: &str) -> Result<bool, SourceError> {
        let status = Command::new(DOCKER_PROGRAM)
            .args(["inspect", "--type", "container", "--format", "{{.Name}}", name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(spawn_error)?;
        Ok(status.success())
    }

    fn find_by_label(&self, label: &str) -> Result<Option<String>, SourceError> {
        let output = Command::new(DOCKER_PROGRAM)
            .args(label_query_args(label))
            .stdin(Stdio::null())
            .output()
            .map_err(spawn_error)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(
                label,
                status = %output.status,
                stderr = %stderr.trim(),
                "Label lookup failed"
            );
            return Ok(None);
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(str::to_string))
    }
}

fn spawn_error(source: io::Error) -> SourceError {
    SourceError::Spawn {
        program: DOCKER_PROGRAM,
        source,
    }
}

// =============================================================================
// DockerLogSource
// =============================================================================

/// `LogSource` following a container's logs through the docker CLI.
pub struct DockerLogSource {
    config: SourceConfig,
}

impl DockerLogSource {
    pub fn new(config: SourceConfig) -> Self {
        Self { config }
    }
}

impl LogSource for DockerLogSource {
    fn follow(&self) -> Result<Box<dyn LineStream>, SourceError> {
        let name = resolve_container(&self.config, &DockerCli)?;

        let mut child = Command::new(DOCKER_PROGRAM)
            .args(["logs", "--follow", "--tail", "0", name.as_str()])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(spawn_error)?;

        let (tx, rx) = crossbeam_channel::bounded(LINE_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            spawn_pipe_reader(stdout, tx.clone(), "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_pipe_reader(stderr, tx, "stderr");
        }

        tracing::info!(container = %name, pid = child.id(), "Following container logs");
        Ok(Box::new(DockerLogStream {
            child,
            lines: rx,
            exit_checked: false,
        }))
    }
}

/// Forward every line of `pipe` into `tx` until EOF or until the receiver
/// is gone. Invalid UTF-8 is replaced rather than rejected.
fn spawn_pipe_reader<R: Read + Send + 'static>(
    pipe: R,
    tx: Sender<io::Result<String>>,
    name: &'static str,
) {
    std::thread::spawn(move || {
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(Ok(line)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.send(Err(e));
                    break;
                }
            }
        }
        tracing::debug!(pipe = name, "Container log pipe closed");
    });
}

struct DockerLogStream {
    child: Child,
    lines: Receiver<io::Result<String>>,
    exit_checked: bool,
}

impl LineStream for DockerLogStream {
    fn next_line(&mut self, wait: Duration) -> NextLine {
        match self.lines.recv_timeout(wait) {
            Ok(Ok(line)) => return NextLine::Line(line),
            Ok(Err(e)) => return NextLine::Failed(e),
            Err(RecvTimeoutError::Timeout) => return NextLine::Idle,
            Err(RecvTimeoutError::Disconnected) => {}
        }

        // Both pipes closed: report a failing exit once, then end.
        if self.exit_checked {
            return NextLine::Ended;
        }
        self.exit_checked = true;
        match self.child.wait() {
            Ok(status) if status.success() => NextLine::Ended,
            Ok(status) => NextLine::Failed(io::Error::other(format!(
                "docker logs exited with {status}"
            ))),
            Err(e) => NextLine::Failed(e),
        }
    }
}

impl Drop for DockerLogStream {
    fn drop(&mut self) {
        if let Err(e) = self.child.kill() {
            // Already exited is the normal case after the source ended.
            if e.kind() != io::ErrorKind::InvalidInput {
                tracing::debug!(error = %e, "Failed to stop docker logs follower");
            }
        }
        let _ = self.child.wait();
    }
}

// =============================================================================
// Unit tests
// =============================================================================
