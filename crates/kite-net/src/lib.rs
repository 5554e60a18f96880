//! KITE Net - Simulated network collaborators
//!
//! In-process stand-ins for the network pieces interop scenarios need:
//! - An internal relay (registrar/forwarder) with start/stop lifecycle
//! - A NAT emulator with cone/symmetric modes and optional logging

pub mod nat;
pub mod relay;

pub use nat::*;
pub use relay::*;
