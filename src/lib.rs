// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for both `main.rs` and
// integration tests.

#[macro_use]
mod macros;

pub mod comms;
pub mod config;
pub mod detection;
pub mod probes;
pub mod store;
