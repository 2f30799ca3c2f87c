// TunnelWatch - web/router.rs
//
// Routes:
//   GET  /stream   live event stream (text/event-stream)
//   GET  /history  retained events, newest first
//   POST /clear    drop all retained events
//   GET  /health   liveness plus retained count

use crate::web::handlers;
use crate::web::state::WebState;
use axum::routing::{get, post};
use axum::Router;

/// Build the application router over `state`.
pub fn build_router(state: WebState) -> Router {
    Router::new()
        .route(
            "/stream",
            get(handlers::stream).fallback(handlers::method_not_allowed),
        )
        .route(
            "/history",
            get(handlers::history).fallback(handlers::method_not_allowed),
        )
        .route(
            "/clear",
            post(handlers::clear).fallback(handlers::method_not_allowed),
        )
        .route(
            "/health",
            get(handlers::health).fallback(handlers::method_not_allowed),
        )
        .fallback(handlers::not_found)
        .with_state(state)
}
