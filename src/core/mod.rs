// TunnelWatch - core/mod.rs
//
// Core business logic layer.
// Dependencies: standard library, serde, regex, chrono.
// Must NOT depend on: app, platform, web, or perform any I/O.

pub mod headers;
pub mod model;
pub mod parser;
