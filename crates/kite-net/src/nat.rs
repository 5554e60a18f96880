//! NAT emulator
//!
//! Emulates address translation between agents without touching real
//! sockets. Cone mode keeps one mapping per source; symmetric mode
//! allocates a fresh mapping per (source, destination) pair. `rebind`
//! expires every mapping at once, which is what the NAT-timeout
//! scenario exercises: traffic through stale mappings fails until the
//! agent refreshes its registration.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// NAT emulation configuration.
#[derive(Debug, Clone)]
pub struct NatConfig {
    /// Allocate per-destination mappings instead of per-source ones.
    pub symmetric: bool,
    /// Log every translation.
    pub logging: bool,
    /// Seed for port allocation.
    pub seed: u64,
}

impl Default for NatConfig {
    fn default() -> Self {
        Self {
            symmetric: false,
            logging: false,
            seed: 0x4b495445, // deterministic by default
        }
    }
}

/// One allocated translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub port: u16,
    /// Generation the mapping was allocated in; stale generations are
    /// unreachable from outside.
    pub epoch: u64,
}

/// The NAT emulator.
pub struct NatEmulator {
    config: NatConfig,
    state: Mutex<NatState>,
}

struct NatState {
    epoch: u64,
    mappings: HashMap<(String, String), Mapping>,
    rng: StdRng,
    translations: u64,
}

impl NatEmulator {
    pub fn new(config: NatConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            state: Mutex::new(NatState {
                epoch: 0,
                mappings: HashMap::new(),
                rng,
                translations: 0,
            }),
        }
    }

    pub fn is_symmetric(&self) -> bool {
        self.config.symmetric
    }

    /// Current mapping generation.
    pub fn epoch(&self) -> u64 {
        self.state.lock().epoch
    }

    /// Translate an outbound flow, allocating a mapping if needed.
    pub fn translate(&self, source: &str, destination: &str) -> Mapping {
        let mut state = self.state.lock();
        let epoch = state.epoch;
        // Cone NATs reuse one external mapping per source.
        let key = if self.config.symmetric {
            (source.to_string(), destination.to_string())
        } else {
            (source.to_string(), String::new())
        };

        let entry = match state.mappings.get(&key) {
            Some(mapping) if mapping.epoch == epoch => *mapping,
            _ => {
                let port = state.rng.gen_range(16384..32768);
                let mapping = Mapping { port, epoch };
                state.mappings.insert(key, mapping);
                mapping
            }
        };

        state.translations += 1;
        if self.config.logging {
            debug!(
                target: "kite",
                source,
                destination,
                port = entry.port,
                epoch = entry.epoch,
                "nat translate"
            );
        }
        entry
    }

    /// Whether a mapping from this epoch is still reachable.
    pub fn is_current(&self, mapping: Mapping) -> bool {
        mapping.epoch == self.state.lock().epoch
    }

    /// Expire every mapping, as a NAT reboot or binding timeout would.
    pub fn rebind(&self) {
        let mut state = self.state.lock();
        state.epoch += 1;
        state.mappings.clear();
        if self.config.logging {
            debug!(target: "kite", epoch = state.epoch, "nat rebind");
        }
    }

    /// Total translations performed.
    pub fn translation_count(&self) -> u64 {
        self.state.lock().translations
    }
}
