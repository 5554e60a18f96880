//! KITE Core - Fundamental types and primitives
//!
//! This crate defines the types shared by the protocol engine facade,
//! the network collaborators, and the interop harness:
//! - Errors (`KiteError`, `KiteResult`)
//! - Level-settable log sinks per subsystem
//! - Observable agent events and event sinks
//! - Minimal URIs

pub mod error;
pub mod event;
pub mod log;
pub mod uri;

pub use error::*;
pub use event::*;
pub use log::*;
pub use uri::*;
