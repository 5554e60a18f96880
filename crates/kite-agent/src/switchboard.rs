//! Shared switchboard state
//!
//! Everything the agents of one engine share: the agent directory, the
//! live call table, and the optional relay/NAT collaborators. Event
//! sinks are never invoked while the switchboard lock is held; callers
//! collect pending deliveries and flush them after unlocking.

use std::collections::HashMap;
use std::sync::Arc;

use kite_core::{AgentEvent, CallState, EventSink, Uri};
use kite_net::{Mapping, NatEmulator, Relay};

pub(crate) type CallId = u64;

pub(crate) struct AgentRecord {
    pub aor: String,
    pub location: Uri,
    pub sink: Option<EventSink>,
    /// Registrar the agent is currently registered against.
    pub registrar: Option<Uri>,
    /// NAT mapping allocated at registration time, if a NAT is up.
    pub nat_mapping: Option<Mapping>,
    pub incoming: Vec<CallId>,
    /// Event packages other agents subscribed to from this agent.
    pub subscriptions: Vec<(char, String)>,
}

pub(crate) struct CallRecord {
    pub caller: char,
    pub callee: char,
    pub state: CallState,
    pub offered_media: Vec<String>,
    pub negotiated_media: Vec<String>,
    pub reliable_provisional: bool,
    pub session_interval: Option<u64>,
    pub session_refreshes: u32,
}

pub(crate) struct Switchboard {
    pub agents: HashMap<char, AgentRecord>,
    pub relay: Option<Arc<Relay>>,
    pub nat: Option<Arc<NatEmulator>>,
    pub calls: HashMap<CallId, CallRecord>,
    pub next_call_id: CallId,
    pub operations: u64,
}

/// An event waiting to be flushed to a sink outside the lock.
pub(crate) struct Delivery {
    pub sink: Option<EventSink>,
    pub event: AgentEvent,
    pub label: String,
}

impl Switchboard {
    pub fn new() -> Self {
        Self {
            agents: HashMap::new(),
            relay: None,
            nat: None,
            calls: HashMap::new(),
            next_call_id: 1,
            operations: 0,
        }
    }

    /// Queue an event for an agent, if it exists.
    pub fn notify(&self, deliveries: &mut Vec<Delivery>, tag: char, event: AgentEvent) {
        if let Some(record) = self.agents.get(&tag) {
            deliveries.push(Delivery {
                sink: record.sink.clone(),
                event,
                label: format!("{}", tag),
            });
        }
    }

    /// An agent is reachable when it is registered and, behind a NAT,
    /// its registration-time mapping is still current.
    pub fn reachable(&self, tag: char) -> bool {
        let Some(record) = self.agents.get(&tag) else {
            return false;
        };
        if record.registrar.is_none() {
            return false;
        }
        match (&self.nat, record.nat_mapping) {
            (Some(nat), Some(mapping)) => nat.is_current(mapping),
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    pub fn allocate_call(&mut self, record: CallRecord) -> CallId {
        let id = self.next_call_id;
        self.next_call_id += 1;
        self.calls.insert(id, record);
        id
    }
}

pub(crate) fn flush(deliveries: Vec<Delivery>) {
    for delivery in deliveries {
        if let Some(sink) = delivery.sink {
            sink(&delivery.event, &delivery.label);
        }
    }
}
