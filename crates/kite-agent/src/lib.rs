//! KITE Agent - User-agent engine facade
//!
//! A deterministic in-process engine hosting up to a handful of user
//! agents. Agents register through the internal relay, place calls to
//! each other over a shared switchboard, and report everything they
//! observe to per-endpoint event sinks. The engine can pump events on
//! a background thread or inline, selected once at startup.

pub mod agent;
pub mod engine;
mod switchboard;

pub use agent::*;
pub use engine::*;
