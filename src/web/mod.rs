// TunnelWatch - web/mod.rs
//
// HTTP surface on axum: shared state, handlers, routing and the server.
// Dependencies: app, util.
// Must NOT depend on: platform.

pub mod handlers;
pub mod router;
pub mod server;
pub mod state;

pub use router::build_router;
pub use server::Server;
pub use state::WebState;
