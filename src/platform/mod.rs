// TunnelWatch - platform/mod.rs
//
// Platform abstraction layer: configuration/data directories and the
// container runtime.
// Dependencies: util, directories crate, and the source traits from
// app::stream (implemented here, consumed there).
// Must NOT depend on: core, web.

pub mod config;
pub mod docker;
