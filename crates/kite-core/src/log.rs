//! Level-settable log sinks
//!
//! Each protocol subsystem (engine, offer/answer negotiator, event
//! notifier, transaction layer, transport layer) carries its own log
//! level. A sink can be *pinned* by an explicit `set_level`; a
//! `soft_set_level` only takes effect on unpinned sinks, so a level
//! given on the command line survives later blanket adjustments.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use tracing::debug;

/// Highest meaningful log level.
pub const MAX_LOG_LEVEL: u8 = 9;

/// A shared, level-gated log sink for one subsystem.
///
/// Clones share state, so a sink handed to a collaborator observes
/// later level changes made by the harness.
#[derive(Clone)]
pub struct LogSink {
    state: Arc<SinkState>,
}

struct SinkState {
    name: &'static str,
    level: AtomicU8,
    pinned: AtomicBool,
}

impl LogSink {
    /// New sink at level 0, unpinned.
    pub fn new(name: &'static str) -> Self {
        Self {
            state: Arc::new(SinkState {
                name,
                level: AtomicU8::new(0),
                pinned: AtomicBool::new(false),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.state.name
    }

    /// Force the level and pin it against soft updates.
    pub fn set_level(&self, level: u8) {
        self.state
            .level
            .store(level.min(MAX_LOG_LEVEL), Ordering::Relaxed);
        self.state.pinned.store(true, Ordering::Relaxed);
    }

    /// Set the level only if no explicit level was pinned earlier.
    pub fn soft_set_level(&self, level: u8) {
        if !self.state.pinned.load(Ordering::Relaxed) {
            self.state
                .level
                .store(level.min(MAX_LOG_LEVEL), Ordering::Relaxed);
        }
    }

    pub fn level(&self) -> u8 {
        self.state.level.load(Ordering::Relaxed)
    }

    pub fn is_pinned(&self) -> bool {
        self.state.pinned.load(Ordering::Relaxed)
    }

    /// Whether a message at `required` level would be emitted.
    pub fn enabled(&self, required: u8) -> bool {
        required <= self.level()
    }

    /// Emit a message if the sink level allows it.
    pub fn emit(&self, required: u8, message: &str) {
        if self.enabled(required) {
            debug!(target: "kite", subsystem = self.state.name, "{}", message);
        }
    }
}

/// The full set of level-bearing subsystems.
#[derive(Clone)]
pub struct Subsystems {
    /// Primary engine log.
    pub engine: LogSink,
    /// Offer/answer media negotiator.
    pub negotiator: LogSink,
    /// Event notifier.
    pub notifier: LogSink,
    /// Transaction layer.
    pub transaction: LogSink,
    /// Transport layer.
    pub transport: LogSink,
}

impl Subsystems {
    pub fn new() -> Self {
        Self {
            engine: LogSink::new("engine"),
            negotiator: LogSink::new("negotiator"),
            notifier: LogSink::new("notifier"),
            transaction: LogSink::new("transaction"),
            transport: LogSink::new("transport"),
        }
    }

    /// Soft-set every subsystem, including the engine.
    pub fn soft_set_all(&self, level: u8) {
        self.engine.soft_set_level(level);
        self.negotiator.soft_set_level(level);
        self.notifier.soft_set_level(level);
        self.transaction.soft_set_level(level);
        self.transport.soft_set_level(level);
    }
}

impl Default for Subsystems {
    fn default() -> Self {
        Self::new()
    }
}
