// TunnelWatch - app/mod.rs
//
// Application layer: event persistence and live fan-out orchestration.
// Dependencies: core layer, util.
// Must NOT depend on: web, platform specifics.

pub mod store;
pub mod stream;
