// TunnelWatch - lib.rs
//
// Library entry point, exposing every module for integration testing and
// for embedding the pipeline behind another front end.
//
// The binary in `main.rs` only wires configuration to these pieces.

pub mod app;
pub mod core;
pub mod platform;
pub mod util;
pub mod web;
