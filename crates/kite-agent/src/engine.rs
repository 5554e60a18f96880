//! Engine lifecycle and the event pump

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use kite_core::{AgentEvent, KiteError, KiteResult, Subsystems, Uri};
use kite_net::{NatEmulator, Relay};

use crate::switchboard::{flush, AgentRecord, Switchboard};
use crate::UserAgent;

/// Engine startup configuration.
#[derive(Clone)]
pub struct EngineConfig {
    /// Pump events on a background thread instead of inline.
    pub threading: bool,
    /// Subsystem log sinks shared with the harness.
    pub subsystems: Subsystems,
    /// Domain agents register under.
    pub domain: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threading: true,
            subsystems: Subsystems::new(),
            domain: "test.example.org".to_string(),
        }
    }
}

/// Engine counters, observable by the harness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub ticks: u64,
    pub operations: u64,
}

pub(crate) struct EngineInner {
    pub switchboard: Mutex<Switchboard>,
    pub subsystems: Subsystems,
    pub domain: String,
    pub running: AtomicBool,
    pub threading: bool,
    ticks: AtomicU64,
    pump_wakeup: Mutex<bool>,
    pump_condvar: Condvar,
}

impl EngineInner {
    /// Count one engine tick; inline mode ticks on every operation.
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn ensure_running(&self) -> KiteResult<()> {
        if self.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(KiteError::EngineStopped)
        }
    }
}

/// The user-agent engine under test.
pub struct Engine {
    inner: Arc<EngineInner>,
    pump: Option<JoinHandle<()>>,
}

impl Engine {
    /// Start an engine. In threaded mode this spawns the event pump.
    pub fn start(config: EngineConfig) -> KiteResult<Self> {
        if config.domain.is_empty() {
            return Err(KiteError::Transport("empty engine domain".to_string()));
        }

        let inner = Arc::new(EngineInner {
            switchboard: Mutex::new(Switchboard::new()),
            subsystems: config.subsystems,
            domain: config.domain,
            running: AtomicBool::new(true),
            threading: config.threading,
            ticks: AtomicU64::new(0),
            pump_wakeup: Mutex::new(false),
            pump_condvar: Condvar::new(),
        });

        inner
            .subsystems
            .engine
            .emit(1, &format!("engine started (threading={})", inner.threading));

        let pump = if config.threading {
            let pump_inner = Arc::clone(&inner);
            Some(std::thread::spawn(move || pump_loop(pump_inner)))
        } else {
            None
        };

        Ok(Self { inner, pump })
    }

    pub fn is_threaded(&self) -> bool {
        self.inner.threading
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            ticks: self.inner.ticks.load(Ordering::Relaxed),
            operations: self.inner.switchboard.lock().operations,
        }
    }

    /// Create a user agent with a one-character tag.
    pub fn create_agent(&self, tag: char) -> KiteResult<UserAgent> {
        self.inner.ensure_running()?;

        let aor = format!("{}@{}", tag, self.inner.domain);
        let location = Uri::parse(&format!("kite:{}.local", tag))?;

        let mut switchboard = self.inner.switchboard.lock();
        if switchboard.agents.contains_key(&tag) {
            return Err(KiteError::AgentExists(tag));
        }
        switchboard.agents.insert(
            tag,
            AgentRecord {
                aor: aor.clone(),
                location: location.clone(),
                sink: None,
                registrar: None,
                nat_mapping: None,
                incoming: Vec::new(),
                subscriptions: Vec::new(),
            },
        );
        drop(switchboard);

        debug!(target: "kite", tag = %tag, aor, "agent created");
        Ok(UserAgent::new(tag, aor, location, Arc::clone(&self.inner)))
    }

    /// Remove an agent and its live calls.
    pub fn destroy_agent(&self, tag: char) -> KiteResult<()> {
        let mut switchboard = self.inner.switchboard.lock();
        if switchboard.agents.remove(&tag).is_none() {
            return Err(KiteError::AgentNotFound(tag));
        }
        switchboard
            .calls
            .retain(|_, call| call.caller != tag && call.callee != tag);
        Ok(())
    }

    /// Route new-registration traffic through this relay.
    pub fn attach_relay(&self, relay: Arc<Relay>) {
        self.inner.switchboard.lock().relay = Some(relay);
    }

    /// Translate all flows through this NAT emulator.
    pub fn attach_nat(&self, nat: Arc<NatEmulator>) {
        self.inner.switchboard.lock().nat = Some(nat);
    }

    pub fn relay(&self) -> Option<Arc<Relay>> {
        self.inner.switchboard.lock().relay.clone()
    }

    pub fn nat(&self) -> Option<Arc<NatEmulator>> {
        self.inner.switchboard.lock().nat.clone()
    }

    /// Stop the engine. Joins the pump, notifies every wired sink with
    /// a shutdown event, and is safe to call more than once.
    pub fn stop(&mut self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }

        {
            let mut wakeup = self.inner.pump_wakeup.lock();
            *wakeup = true;
            self.inner.pump_condvar.notify_all();
        }
        if let Some(pump) = self.pump.take() {
            let _ = pump.join();
        }

        let mut deliveries = Vec::new();
        {
            let switchboard = self.inner.switchboard.lock();
            let tags: Vec<char> = switchboard.agents.keys().copied().collect();
            for tag in tags {
                switchboard.notify(&mut deliveries, tag, AgentEvent::Shutdown);
            }
        }
        flush(deliveries);

        self.inner.subsystems.engine.emit(1, "engine stopped");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pump_loop(inner: Arc<EngineInner>) {
    while inner.running.load(Ordering::Acquire) {
        inner.tick();
        let mut wakeup = inner.pump_wakeup.lock();
        if !*wakeup {
            inner
                .pump_condvar
                .wait_for(&mut wakeup, Duration::from_millis(5));
        }
        *wakeup = false;
    }
}
