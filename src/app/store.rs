// TunnelWatch - app/store.rs
//
// Event store: the bounded recent history of classified events, held in
// memory and mirrored to an append-only JSON-lines file.
//
// Design principles:
// - One `Mutex` guards both halves, so `append`, `clear` and `history`
//   are mutually exclusive and a reader never sees a half-applied change.
// - Memory is authoritative. A failed disk write is logged and the in-memory
//   append stands; the next append retries opening the file.
// - The file is trimmed every `trim_interval` appends by rewriting it from the
//   in-memory buffer (write temp -> rename), so after a trim it holds exactly
//   the retained suffix and a crash mid-trim never corrupts the previous file.
// - Startup replay decodes each line independently; corrupt lines are
//   counted and skipped rather than aborting the load.

use crate::core::model::LogEvent;
use crate::util::constants;
use crate::util::error::StoreError;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

// =============================================================================
// Configuration
// =============================================================================

/// Store sizing and location.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum number of events retained (memory and, after a trim, disk).
    pub max_entries: usize,
    /// Backing JSON-lines file.
    pub path: PathBuf,
    /// Number of appends between two trims of the backing file.
    pub trim_interval: usize,
}

impl StoreConfig {
    /// Default sizing with the given backing file.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            max_entries: constants::DEFAULT_MAX_ENTRIES,
            path: path.into(),
            trim_interval: constants::DEFAULT_TRIM_INTERVAL,
        }
    }
}

// =============================================================================
// Replay
// =============================================================================

/// Outcome of reading a backing file at startup.
#[derive(Debug, Default)]
pub struct ReplayResult {
    /// Decoded events, oldest first, at most `capacity` of them (the newest).
    pub events: VecDeque<LogEvent>,
    /// Lines that failed to decode and were skipped.
    pub skipped: usize,
}

/// Read `path` line by line, keeping the newest `capacity` decodable events.
///
/// A missing file is a normal first run and yields an empty result. Blank
/// lines are ignored; undecodable lines (bad JSON or bad UTF-8) are counted
/// in `skipped`. Any other read error stops the replay with what was read
/// so far.
pub fn replay_file(path: &Path, capacity: usize) -> ReplayResult {
    let mut result = ReplayResult::default();

    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %path.display(), error = %e, "Cannot open event file");
            }
            return result;
        }
    };

    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                result.skipped += 1;
                continue;
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Event file read failed; keeping events read so far"
                );
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<LogEvent>(&line) {
            Ok(event) => {
                result.events.push_back(event);
                if result.events.len() > capacity {
                    result.events.pop_front();
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Skipping corrupt event record");
                result.skipped += 1;
            }
        }
    }

    result
}

// =============================================================================
// EventStore
// =============================================================================

struct StoreInner {
    /// Retained events, oldest at the front.
    events: VecDeque<LogEvent>,
    /// Open append handle; `None` until first use or after a failure/rewrite.
    writer: Option<File>,
    /// Appends since the last trim.
    appends_since_trim: usize,
}

/// Shared, bounded, file-backed event history.
///
/// Constructed once at process start and passed by `Arc` to every
/// streaming session and HTTP handler.
pub struct EventStore {
    config: StoreConfig,
    inner: Mutex<StoreInner>,
}

impl EventStore {
    /// Open the store, replaying any existing backing file into memory.
    pub fn open(config: StoreConfig) -> Self {
        let replay = replay_file(&config.path, config.max_entries);

        if replay.skipped > 0 {
            tracing::warn!(
                path = %config.path.display(),
                skipped = replay.skipped,
                "Skipped corrupt records while loading event history"
            );
        }
        tracing::info!(
            path = %config.path.display(),
            loaded = replay.events.len(),
            capacity = config.max_entries,
            "Event store opened"
        );

        Self {
            config,
            inner: Mutex::new(StoreInner {
                events: replay.events,
                writer: None,
                appends_since_trim: 0,
            }),
        }
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of events currently retained in memory.
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append `event` to memory and disk.
    ///
    /// Evicts the oldest event once at capacity. Disk failures are logged
    /// and do not undo the in-memory append.
    pub fn append(&self, event: &LogEvent) {
        let mut inner = self.lock();

        inner.events.push_back(event.clone());
        while inner.events.len() > self.config.max_entries {
            inner.events.pop_front();
        }

        if let Err(e) = self.write_record(&mut inner, event) {
            tracing::warn!(error = %e, "Event persisted in memory only");
            inner.writer = None;
        }

        inner.appends_since_trim += 1;
        if inner.appends_since_trim >= self.config.trim_interval {
            inner.appends_since_trim = 0;
            if let Err(e) = self.rewrite(&mut inner) {
                tracing::warn!(error = %e, "Event file trim failed");
            }
        }
    }

    /// Point-in-time snapshot of all retained events, newest first.
    pub fn history(&self) -> Vec<LogEvent> {
        self.lock().events.iter().rev().cloned().collect()
    }

    /// Empty both memory and the backing file.
    ///
    /// The file is truncated first; if that fails nothing is cleared, so the
    /// two halves never disagree once the lock is released.
    pub fn clear(&self) -> Result<(), StoreError> {
        let mut inner = self.lock();

        inner.writer = None;
        self.ensure_parent_dir()?;
        File::create(&self.config.path).map_err(|e| self.io_error("truncate", e))?;

        inner.events.clear();
        inner.appends_since_trim = 0;

        tracing::info!(path = %self.config.path.display(), "Event store cleared");
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panic while holding the lock cannot leave the deque half-updated
        // (every mutation is a single push/pop/clear), so poisoning is ignored.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_record(&self, inner: &mut StoreInner, event: &LogEvent) -> Result<(), StoreError> {
        let mut record =
            serde_json::to_string(event).map_err(|e| StoreError::Serialize { source: e })?;
        record.push('\n');

        if inner.writer.is_none() {
            self.ensure_parent_dir()?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.config.path)
                .map_err(|e| self.io_error("open", e))?;
            inner.writer = Some(file);
        }

        if let Some(file) = inner.writer.as_mut() {
            file.write_all(record.as_bytes())
                .and_then(|_| file.flush())
                .map_err(|e| self.io_error("append", e))?;
        }
        Ok(())
    }

    /// Rewrite the backing file so it holds exactly the in-memory events.
    fn rewrite(&self, inner: &mut StoreInner) -> Result<(), StoreError> {
        // The append handle would point at the replaced inode after rename.
        inner.writer = None;
        self.ensure_parent_dir()?;

        let mut body = String::new();
        for event in &inner.events {
            let record =
                serde_json::to_string(event).map_err(|e| StoreError::Serialize { source: e })?;
            body.push_str(&record);
            body.push('\n');
        }

        let tmp = self.config.path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, body.as_bytes()).map_err(|e| self.io_error("trim write", e))?;
        std::fs::rename(&tmp, &self.config.path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            self.io_error("trim rename", e)
        })?;

        tracing::debug!(
            path = %self.config.path.display(),
            records = inner.events.len(),
            "Event file trimmed"
        );
        Ok(())
    }

    fn ensure_parent_dir(&self) -> Result<(), StoreError> {
        match self.config.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io {
                    path: parent.to_path_buf(),
                    operation: "create directory",
                    source: e,
                })
            }
            _ => Ok(()),
        }
    }

    fn io_error(&self, operation: &'static str, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.config.path.clone(),
            operation,
            source,
        }
    }
}

// =============================================================================
// Unit tests
// =============================================================================
