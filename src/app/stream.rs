// TunnelWatch - app/stream.rs
//
// Live fan-out: turns a blocking line source into classified events, commits
// each event to the store once, and offers it to every connected viewer.
//
// Architecture:
//   - `StreamHub` is shared by all HTTP sessions. `subscribe` registers a
//     bounded per-viewer queue and, if no pump is running, spawns one.
//   - `run_pump` runs on a background thread: attach to the source, then
//     loop read -> classify -> persist -> broadcast. It blocks on the next
//     line for at most `PUMP_IDLE_CHECK_MS`, then re-checks its viewers.
//   - A full viewer queue drops that event for that viewer only, so a slow
//     viewer never stalls the pump or any other viewer.
//   - Dropping a `Subscription` removes its queue from the hub at once.
//     When none remain, the pump detaches from the source on its next wake
//     (dropping the stream kills the follower process).
//
// Lifecycle:
//   CONNECTING -> STREAMING -> SOURCE_NOT_FOUND | SOURCE_ERROR | ended
//   On not-found or a read failure one synthetic error event is persisted
//   and broadcast, then every viewer queue is closed.

use crate::app::store::EventStore;
use crate::core::model::LogEvent;
use crate::core::parser;
use crate::util::constants::PUMP_IDLE_CHECK_MS;
use crate::util::error::SourceError;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::Stream;

// =============================================================================
// Source seam
// =============================================================================

/// Result of waiting for the next line of a followed stream.
#[derive(Debug)]
pub enum NextLine {
    /// One line of output.
    Line(String),
    /// Nothing arrived within the wait.
    Idle,
    /// Reading failed; the stream is unusable.
    Failed(io::Error),
    /// The source ended normally.
    Ended,
}

/// A followed, line-oriented, potentially infinite stream.
pub trait LineStream: Send {
    /// Wait up to `wait` for the next line.
    fn next_line(&mut self, wait: Duration) -> NextLine;
}

/// Something that can be attached to and followed.
pub trait LogSource: Send + Sync {
    /// Attach to the monitored process and start following new lines.
    fn follow(&self) -> Result<Box<dyn LineStream>, SourceError>;
}

// =============================================================================
// StreamHub
// =============================================================================

struct Viewer {
    id: u64,
    tx: mpsc::Sender<LogEvent>,
}

struct HubState {
    viewers: Vec<Viewer>,
    pump_active: bool,
    /// Incremented per pump so log lines can be correlated.
    generation: u64,
    next_viewer_id: u64,
}

/// Shared fan-out point between one source and any number of viewers.
#[derive(Clone)]
pub struct StreamHub {
    source: Arc<dyn LogSource>,
    store: Arc<EventStore>,
    state: Arc<Mutex<HubState>>,
    subscriber_buffer: usize,
}

/// One viewer's end of the fan-out. Yields events until the stream
/// terminates; dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    events: mpsc::Receiver<LogEvent>,
    state: Arc<Mutex<HubState>>,
}

impl StreamHub {
    pub fn new(
        source: Arc<dyn LogSource>,
        store: Arc<EventStore>,
        subscriber_buffer: usize,
    ) -> Self {
        Self {
            source,
            store,
            state: Arc::new(Mutex::new(HubState {
                viewers: Vec::new(),
                pump_active: false,
                generation: 0,
                next_viewer_id: 0,
            })),
            subscriber_buffer: subscriber_buffer.max(1),
        }
    }

    /// Register a new viewer and make sure a pump is feeding the hub.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.subscriber_buffer);

        let mut state = lock(&self.state);
        let id = state.next_viewer_id;
        state.next_viewer_id += 1;
        state.viewers.push(Viewer { id, tx });
        let viewers = state.viewers.len();

        if !state.pump_active {
            state.pump_active = true;
            state.generation += 1;
            let generation = state.generation;
            let hub = self.clone();
            std::thread::spawn(move || run_pump(hub, generation));
            tracing::info!(generation, "Stream pump started");
        }
        drop(state);

        tracing::debug!(viewer = id, viewers, "Viewer subscribed");
        Subscription {
            id,
            events: rx,
            state: Arc::clone(&self.state),
        }
    }

    /// Number of viewers currently registered.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.state).viewers.len()
    }

    /// Whether a pump thread is currently attached to the source.
    pub fn is_pumping(&self) -> bool {
        lock(&self.state).pump_active
    }

    /// Drop closed queues and report whether any viewer remains.
    ///
    /// With none left the pump is marked inactive under the same lock, so a
    /// concurrent `subscribe` starts a fresh pump instead of joining a
    /// dying one.
    fn retain_viewers(&self) -> bool {
        let mut state = lock(&self.state);
        state.viewers.retain(|v| !v.tx.is_closed());
        if state.viewers.is_empty() {
            state.pump_active = false;
            return false;
        }
        true
    }

    /// Persist `event` and offer it to every viewer.
    ///
    /// Returns `false` when no viewer remains (see `retain_viewers`).
    fn publish(&self, event: LogEvent) -> bool {
        self.store.append(&event);

        let mut state = lock(&self.state);
        state.viewers.retain(|v| match v.tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(viewer = v.id, "Viewer queue full; dropping event for that viewer");
                true
            }
            Err(TrySendError::Closed(_)) => false,
        });

        if state.viewers.is_empty() {
            state.pump_active = false;
            return false;
        }
        true
    }

    /// End the stream: optionally persist and offer one last event, then
    /// close every viewer queue and mark the pump inactive, all under one
    /// lock so no viewer can subscribe in between.
    fn finish(&self, last: Option<LogEvent>) {
        if let Some(event) = &last {
            self.store.append(event);
        }

        let mut state = lock(&self.state);
        if let Some(event) = last {
            for viewer in &state.viewers {
                let _ = viewer.tx.try_send(event.clone());
            }
        }
        state.pump_active = false;
        state.viewers.clear();
    }
}

impl Stream for Subscription {
    type Item = LogEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<LogEvent>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut state = lock(&self.state);
        state.viewers.retain(|v| v.id != self.id);
        tracing::debug!(viewer = self.id, viewers = state.viewers.len(), "Viewer left");
    }
}

fn lock(state: &Mutex<HubState>) -> MutexGuard<'_, HubState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Pump
// =============================================================================

/// Background loop for one attachment to the source.
fn run_pump(hub: StreamHub, generation: u64) {
    let mut stream = match hub.source.follow() {
        Ok(s) => s,
        Err(e) => {
            let message = match &e {
                SourceError::NotFound { .. } => e.to_string(),
                _ => format!("Error: {e}"),
            };
            tracing::warn!(generation, error = %e, "Cannot attach to log source");
            hub.finish(Some(LogEvent::failure(message)));
            return;
        }
    };

    tracing::debug!(generation, "Attached to log source");
    let wait = Duration::from_millis(PUMP_IDLE_CHECK_MS);
    let mut forwarded: u64 = 0;

    loop {
        if !hub.retain_viewers() {
            tracing::info!(generation, forwarded, "No viewers left; detaching from source");
            return;
        }

        let line = match stream.next_line(wait) {
            NextLine::Line(line) => line,
            NextLine::Idle => continue,
            NextLine::Failed(e) => {
                tracing::warn!(generation, error = %e, "Log source read failed");
                hub.finish(Some(LogEvent::failure(format!("Error: {e}"))));
                return;
            }
            NextLine::Ended => {
                tracing::info!(generation, forwarded, "Log source ended");
                hub.finish(None);
                return;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let Some(event) = parser::classify(line) else {
            continue;
        };

        tracing::trace!(
            generation,
            kind = event.kind(),
            timestamp = event.timestamp(),
            "Event classified"
        );
        forwarded += 1;
        if !hub.publish(event) {
            tracing::info!(generation, forwarded, "No viewers left; detaching from source");
            return;
        }
    }
}

// =============================================================================
// Unit tests
// =============================================================================
