// TunnelWatch - web/state.rs

use crate::app::store::EventStore;
use crate::app::stream::StreamHub;
use std::sync::Arc;
use std::time::Duration;

/// Handles every request handler needs, cloned per request by axum.
#[derive(Clone)]
pub struct WebState {
    pub store: Arc<EventStore>,
    pub hub: StreamHub,
    /// Idle interval after which `/stream` sends a keep-alive comment.
    pub keepalive: Duration,
}
