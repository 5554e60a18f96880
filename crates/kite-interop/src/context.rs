//! Endpoint and run contexts
//!
//! The run context is the aggregate root threaded through every
//! scenario: the parsed configuration, the three endpoint contexts,
//! the optional relay/NAT collaborators, the engine handle, and the
//! aggregate result. It is constructed once after parsing and torn
//! down exactly once, in reverse acquisition order; the lifecycle
//! journal records both directions so ordering is checkable.

use std::sync::Arc;

use kite_agent::{Engine, UserAgent};
use kite_core::{EventSink, Subsystems};
use kite_net::{NatEmulator, Relay};

use crate::config::RunConfig;
use crate::PROGRAM;

/// Ordered record of lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    ArenaInit,
    EndpointInit(char),
    RelayStarted,
    NatStarted,
    EngineStarted,
    EngineStopped,
    NatStopped,
    RelayStopped,
    EndpointReleased(char),
    ArenaReleased,
}

/// One simulated actor's per-run state.
pub struct EndpointContext {
    pub tag: char,
    /// Event-report sink; `None` discards events.
    pub sink: Option<EventSink>,
    /// Engine handle, populated by the engine-init checkpoint.
    pub agent: Option<UserAgent>,
}

impl EndpointContext {
    fn new(tag: char) -> Self {
        Self {
            tag,
            sink: None,
            agent: None,
        }
    }

    /// Push the context's current sink down to the live agent.
    pub fn apply_sink(&self) {
        if let Some(agent) = &self.agent {
            agent.set_event_sink(self.sink.clone());
        }
    }
}

/// The aggregate threaded through every scenario invocation.
pub struct RunContext {
    pub config: RunConfig,
    pub subsystems: Subsystems,
    pub a: EndpointContext,
    pub b: EndpointContext,
    pub c: EndpointContext,
    pub engine: Option<Engine>,
    pub relay: Option<Arc<Relay>>,
    /// Whether the relay was ever started this run; the unregister
    /// gate depends on it even after the relay is gone.
    pub relay_started: bool,
    pub nat: Option<Arc<NatEmulator>>,
    /// Bitwise OR of every executed checkpoint's result.
    pub aggregate: i32,
    pub journal: Vec<LifecycleEvent>,
    torn_down: bool,
}

impl RunContext {
    /// Allocate the arena and the three endpoints, in order.
    pub fn new(config: RunConfig, subsystems: Subsystems) -> Self {
        let mut ctx = Self {
            config,
            subsystems,
            a: EndpointContext::new('a'),
            b: EndpointContext::new('b'),
            c: EndpointContext::new('c'),
            engine: None,
            relay: None,
            relay_started: false,
            nat: None,
            aggregate: 0,
            journal: Vec::new(),
            torn_down: false,
        };
        ctx.record(LifecycleEvent::ArenaInit);
        for tag in ['a', 'b', 'c'] {
            ctx.record(LifecycleEvent::EndpointInit(tag));
        }
        ctx
    }

    pub fn record(&mut self, event: LifecycleEvent) {
        self.journal.push(event);
    }

    /// The endpoints in initialization order.
    pub fn endpoints_mut(&mut self) -> [&mut EndpointContext; 3] {
        [&mut self.a, &mut self.b, &mut self.c]
    }

    /// Release everything, exactly once, in reverse acquisition order:
    /// collaborators, then endpoints, then the arena.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(mut engine) = self.engine.take() {
            engine.stop();
            self.record(LifecycleEvent::EngineStopped);
        }
        if self.nat.take().is_some() {
            self.record(LifecycleEvent::NatStopped);
        }
        if let Some(relay) = self.relay.take() {
            relay.stop();
            self.record(LifecycleEvent::RelayStopped);
        }
        for endpoint in [&mut self.c, &mut self.b, &mut self.a] {
            endpoint.agent = None;
            endpoint.sink = None;
            self.journal
                .push(LifecycleEvent::EndpointReleased(endpoint.tag));
        }
        self.record(LifecycleEvent::ArenaReleased);
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Event printer wired to endpoints whose event flags are set.
pub fn event_printer() -> EventSink {
    Arc::new(|event, label| {
        println!("{}: {}: event {}", PROGRAM, label, event.label());
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RunContext {
        RunContext::new(RunConfig::default(), Subsystems::new())
    }

    #[test]
    fn endpoints_initialize_in_order() {
        let ctx = ctx();
        assert_eq!(
            ctx.journal,
            vec![
                LifecycleEvent::ArenaInit,
                LifecycleEvent::EndpointInit('a'),
                LifecycleEvent::EndpointInit('b'),
                LifecycleEvent::EndpointInit('c'),
            ]
        );
        assert!(ctx.a.sink.is_none() && ctx.b.sink.is_none() && ctx.c.sink.is_none());
    }

    #[test]
    fn teardown_is_reverse_of_init_and_runs_once() {
        let mut ctx = ctx();
        ctx.teardown();
        ctx.teardown();

        assert_eq!(
            ctx.journal,
            vec![
                LifecycleEvent::ArenaInit,
                LifecycleEvent::EndpointInit('a'),
                LifecycleEvent::EndpointInit('b'),
                LifecycleEvent::EndpointInit('c'),
                LifecycleEvent::EndpointReleased('c'),
                LifecycleEvent::EndpointReleased('b'),
                LifecycleEvent::EndpointReleased('a'),
                LifecycleEvent::ArenaReleased,
            ]
        );
    }

    #[test]
    fn identical_configs_yield_identical_journals() {
        let mut first = ctx();
        first.teardown();
        let mut second = ctx();
        second.teardown();
        assert_eq!(first.journal, second.journal);
    }
}
