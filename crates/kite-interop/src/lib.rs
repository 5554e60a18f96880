//! KITE Interop - Scripted interoperability-test orchestrator
//!
//! Stands up three simulated protocol endpoints, optionally an internal
//! relay and a NAT emulator, then drives a fixed battery of scenarios
//! against them. Results aggregate by bitwise OR; a configurable
//! stop-on-first-failure policy and a watchdog guard timer bound the
//! run.

pub mod config;
pub mod context;
pub mod guard;
pub mod scenarios;
pub mod sequencer;
pub mod trace;

/// Name the harness reports itself as.
pub const PROGRAM: &str = "kite-interop";
