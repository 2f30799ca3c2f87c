// TunnelWatch - web/handlers.rs
//
// Request handlers. Every JSON body is built with `serde_json::json!` so
// the wire shape stays visible next to the handler that produces it.

use crate::web::state::WebState;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};

/// Comment text of the idle keep-alive frame.
const KEEPALIVE_TEXT: &str = "keep-alive";

/// `GET /stream`: live events as server-sent `data:` frames.
///
/// The response ends when the hub closes the subscription (source gone or
/// failed); a viewer disconnecting drops the subscription and unsubscribes.
pub async fn stream(
    State(state): State<WebState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.hub.subscribe();

    let frames = subscription.filter_map(|event| match Event::default().json_data(&event) {
        Ok(frame) => Some(Ok(frame)),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode event; skipped");
            None
        }
    });

    Sse::new(frames).keep_alive(
        KeepAlive::new()
            .interval(state.keepalive)
            .text(KEEPALIVE_TEXT),
    )
}

/// `GET /history`: retained events, newest first.
pub async fn history(State(state): State<WebState>) -> Json<serde_json::Value> {
    Json(json!({ "logs": state.store.history() }))
}

/// `POST /clear`: drop every retained event from memory and disk.
pub async fn clear(State(state): State<WebState>) -> Response {
    let store = Arc::clone(&state.store);
    let outcome = match tokio::task::spawn_blocking(move || store.clear()).await {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };

    match outcome {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(error) => {
            tracing::warn!(error = %error, "Clearing the event store failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": error })),
            )
                .into_response()
        }
    }
}

/// `GET /health`: liveness plus the retained event count.
pub async fn health(State(state): State<WebState>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "retained": state.store.len() }))
}

/// Any path without a route.
pub async fn not_found(uri: Uri) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("no route for {}", uri.path()) })),
    )
}

/// A known path requested with the wrong method.
pub async fn method_not_allowed(
    method: Method,
    uri: Uri,
) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": format!("{method} is not allowed on {}", uri.path()) })),
    )
}
