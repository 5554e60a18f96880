//! User-agent operations
//!
//! Each operation is blocking and synchronous from the caller's point
//! of view. Events are delivered to the involved endpoints' sinks
//! before the operation returns; in single-threaded mode the engine
//! tick happens inline here.

use std::sync::Arc;

use kite_core::{AgentEvent, CallState, EventSink, KiteError, KiteResult, Uri};
use kite_net::Credentials;

use crate::engine::EngineInner;
use crate::switchboard::{flush, CallRecord, Delivery};

/// Identifier for a live call.
pub type CallId = u64;

/// Options for an outgoing call.
#[derive(Debug, Clone)]
pub struct InviteOptions {
    /// Media types offered to the callee.
    pub media: Vec<String>,
    /// Demand reliable provisional responses.
    pub reliable_provisional: bool,
    /// Session timer interval in seconds.
    pub session_interval: Option<u64>,
}

impl Default for InviteOptions {
    fn default() -> Self {
        Self {
            media: vec!["audio".to_string()],
            reliable_provisional: false,
            session_interval: None,
        }
    }
}

/// One simulated protocol participant.
pub struct UserAgent {
    tag: char,
    aor: String,
    location: Uri,
    engine: Arc<EngineInner>,
}

impl UserAgent {
    pub(crate) fn new(tag: char, aor: String, location: Uri, engine: Arc<EngineInner>) -> Self {
        Self {
            tag,
            aor,
            location,
            engine,
        }
    }

    pub fn tag(&self) -> char {
        self.tag
    }

    pub fn aor(&self) -> &str {
        &self.aor
    }

    pub fn location(&self) -> &Uri {
        &self.location
    }

    /// Wire (or clear) the event sink for this agent.
    pub fn set_event_sink(&self, sink: Option<EventSink>) {
        if let Some(record) = self.engine.switchboard.lock().agents.get_mut(&self.tag) {
            record.sink = sink;
        }
    }

    fn op<T>(
        &self,
        f: impl FnOnce(&mut crate::switchboard::Switchboard, &mut Vec<Delivery>) -> KiteResult<T>,
    ) -> KiteResult<T> {
        self.engine.ensure_running()?;
        if !self.engine.threading {
            self.engine.tick();
        }

        let mut deliveries = Vec::new();
        let result = {
            let mut switchboard = self.engine.switchboard.lock();
            switchboard.operations += 1;
            f(&mut switchboard, &mut deliveries)
        };
        flush(deliveries);
        result
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register this agent's location with a registrar.
    ///
    /// When the registrar is the attached relay, the binding goes into
    /// the relay's table and may be challenged. Any other registrar
    /// (an outbound proxy override) is recorded as-is.
    pub fn register(&self, registrar: &Uri, credentials: Option<&Credentials>) -> KiteResult<()> {
        let tag = self.tag;
        let aor = self.aor.clone();
        let location = self.location.clone();
        let registrar = registrar.clone();

        self.op(move |switchboard, deliveries| {
            let relay = switchboard.relay.clone();
            if let Some(relay) = relay.filter(|r| r.uri() == &registrar) {
                if let Err(err) = relay.bind(&aor, location, credentials) {
                    let code = match &err {
                        KiteError::RegistrationRejected { code } => *code,
                        _ => 500,
                    };
                    switchboard.notify(deliveries, tag, AgentEvent::RegisterFailed { code });
                    return Err(err);
                }
            }

            let mapping = switchboard
                .nat
                .as_ref()
                .map(|nat| nat.translate(&aor, &registrar.to_string()));

            let record = switchboard
                .agents
                .get_mut(&tag)
                .ok_or(KiteError::AgentNotFound(tag))?;
            record.registrar = Some(registrar.clone());
            record.nat_mapping = mapping;

            switchboard.notify(deliveries, tag, AgentEvent::RegisterOk { registrar });
            Ok(())
        })
    }

    /// Drop this agent's registration.
    pub fn unregister(&self) -> KiteResult<()> {
        let tag = self.tag;

        self.op(move |switchboard, deliveries| {
            let (aor, registrar) = {
                let record = switchboard
                    .agents
                    .get_mut(&tag)
                    .ok_or(KiteError::AgentNotFound(tag))?;
                let registrar = record.registrar.take().ok_or(KiteError::NotRegistered)?;
                (record.aor.clone(), registrar)
            };
            if let Some(relay) = switchboard.relay.clone() {
                if relay.uri() == &registrar && relay.is_running() {
                    relay.unbind(&aor)?;
                }
            }
            if let Some(record) = switchboard.agents.get_mut(&tag) {
                record.nat_mapping = None;
            }
            switchboard.notify(deliveries, tag, AgentEvent::Unregistered);
            Ok(())
        })
    }

    pub fn is_registered(&self) -> bool {
        self.engine
            .switchboard
            .lock()
            .agents
            .get(&self.tag)
            .is_some_and(|record| record.registrar.is_some())
    }

    // ------------------------------------------------------------------
    // Connectivity
    // ------------------------------------------------------------------

    /// Round-trip reachability probe to a peer agent.
    pub fn ping(&self, peer: char) -> KiteResult<()> {
        let tag = self.tag;
        self.op(move |switchboard, _| {
            let location = switchboard
                .agents
                .get(&peer)
                .ok_or(KiteError::AgentNotFound(peer))?
                .location
                .clone();
            if !switchboard.reachable(peer) || !switchboard.reachable(tag) {
                return Err(KiteError::Unreachable(location));
            }
            Ok(())
        })
    }

    /// Send a request with an arbitrary method to a peer.
    ///
    /// Returns the peer's response code; methods outside the core set
    /// get 501.
    pub fn request(&self, peer: char, method: &str) -> KiteResult<u16> {
        let method = method.to_string();
        self.op(move |switchboard, _| {
            if !switchboard.agents.contains_key(&peer) {
                return Err(KiteError::AgentNotFound(peer));
            }
            let code = match method.as_str() {
                "PING" | "OPTIONS" | "INFO" => 200,
                _ => 501,
            };
            Ok(code)
        })
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    /// Place a call to a peer agent.
    pub fn invite(&self, peer: char, options: InviteOptions) -> KiteResult<CallId> {
        let tag = self.tag;
        let from = self.location.clone();

        self.op(move |switchboard, deliveries| {
            let peer_location = switchboard
                .agents
                .get(&peer)
                .ok_or(KiteError::AgentNotFound(peer))?
                .location
                .clone();
            if !switchboard.reachable(peer) {
                return Err(KiteError::Unreachable(peer_location));
            }

            let call_id = switchboard.allocate_call(CallRecord {
                caller: tag,
                callee: peer,
                state: CallState::Calling,
                offered_media: options.media.clone(),
                negotiated_media: Vec::new(),
                reliable_provisional: options.reliable_provisional,
                session_interval: options.session_interval,
                session_refreshes: 0,
            });

            if let Some(record) = switchboard.agents.get_mut(&peer) {
                record.incoming.push(call_id);
            }

            switchboard.notify(
                deliveries,
                tag,
                AgentEvent::CallStateChanged {
                    state: CallState::Calling,
                },
            );
            switchboard.notify(deliveries, peer, AgentEvent::IncomingCall { from });
            Ok(call_id)
        })
    }

    /// Calls waiting for this agent's answer.
    pub fn incoming_calls(&self) -> Vec<CallId> {
        self.engine
            .switchboard
            .lock()
            .agents
            .get(&self.tag)
            .map(|record| record.incoming.clone())
            .unwrap_or_default()
    }

    pub fn call_state(&self, call_id: CallId) -> Option<CallState> {
        self.engine
            .switchboard
            .lock()
            .calls
            .get(&call_id)
            .map(|call| call.state)
    }

    /// Media negotiated for a ready call.
    pub fn negotiated_media(&self, call_id: CallId) -> Vec<String> {
        self.engine
            .switchboard
            .lock()
            .calls
            .get(&call_id)
            .map(|call| call.negotiated_media.clone())
            .unwrap_or_default()
    }

    /// Send a provisional progress response for an incoming call.
    ///
    /// With a reliable-provisional offer the caller sees `Early`,
    /// otherwise `Proceeding`.
    pub fn progress(&self, call_id: CallId) -> KiteResult<()> {
        let tag = self.tag;
        self.op(move |switchboard, deliveries| {
            let call = switchboard
                .calls
                .get_mut(&call_id)
                .ok_or(KiteError::CallNotFound)?;
            if call.callee != tag {
                return Err(KiteError::InvalidCallState("progress"));
            }
            if call.state != CallState::Calling {
                return Err(KiteError::InvalidCallState("progress"));
            }
            let state = if call.reliable_provisional {
                CallState::Early
            } else {
                CallState::Proceeding
            };
            call.state = state;
            let caller = call.caller;
            switchboard.notify(deliveries, caller, AgentEvent::CallStateChanged { state });
            Ok(())
        })
    }

    /// Answer an incoming call, negotiating media.
    ///
    /// An empty `accepted_media` accepts everything offered. An empty
    /// negotiation result rejects the call with 488 on both sides.
    pub fn answer(&self, call_id: CallId, accepted_media: &[&str]) -> KiteResult<()> {
        let tag = self.tag;
        let accepted: Vec<String> = accepted_media.iter().map(|m| m.to_string()).collect();

        self.op(move |switchboard, deliveries| {
            let call = switchboard
                .calls
                .get_mut(&call_id)
                .ok_or(KiteError::CallNotFound)?;
            if call.callee != tag {
                return Err(KiteError::InvalidCallState("answer"));
            }
            if matches!(call.state, CallState::Ready | CallState::Terminated) {
                return Err(KiteError::InvalidCallState("answer"));
            }

            let negotiated: Vec<String> = if accepted.is_empty() {
                call.offered_media.clone()
            } else {
                call.offered_media
                    .iter()
                    .filter(|m| accepted.contains(m))
                    .cloned()
                    .collect()
            };

            let caller = call.caller;
            if negotiated.is_empty() {
                call.state = CallState::Terminated;
                remove_incoming(switchboard, tag, call_id);
                switchboard.notify(deliveries, caller, AgentEvent::CallTerminated { code: 488 });
                return Err(KiteError::CallRejected { code: 488 });
            }

            call.negotiated_media = negotiated;
            call.state = CallState::Ready;
            remove_incoming(switchboard, tag, call_id);
            for target in [caller, tag] {
                switchboard.notify(
                    deliveries,
                    target,
                    AgentEvent::CallStateChanged {
                        state: CallState::Ready,
                    },
                );
            }
            Ok(())
        })
    }

    /// Reject an incoming call with a response code.
    pub fn reject(&self, call_id: CallId, code: u16) -> KiteResult<()> {
        let tag = self.tag;
        self.op(move |switchboard, deliveries| {
            let call = switchboard
                .calls
                .get_mut(&call_id)
                .ok_or(KiteError::CallNotFound)?;
            if call.callee != tag {
                return Err(KiteError::InvalidCallState("reject"));
            }
            call.state = CallState::Terminated;
            let caller = call.caller;
            remove_incoming(switchboard, tag, call_id);
            switchboard.notify(deliveries, caller, AgentEvent::CallTerminated { code });
            Ok(())
        })
    }

    /// Redirect an incoming call to another target (302 semantics).
    pub fn redirect(&self, call_id: CallId, target: Uri) -> KiteResult<()> {
        let tag = self.tag;
        self.op(move |switchboard, deliveries| {
            let call = switchboard
                .calls
                .get_mut(&call_id)
                .ok_or(KiteError::CallNotFound)?;
            if call.callee != tag {
                return Err(KiteError::InvalidCallState("redirect"));
            }
            call.state = CallState::Terminated;
            let caller = call.caller;
            remove_incoming(switchboard, tag, call_id);
            switchboard.notify(deliveries, caller, AgentEvent::Redirected { target });
            switchboard.notify(deliveries, caller, AgentEvent::CallTerminated { code: 302 });
            Ok(())
        })
    }

    /// Cancel a call this agent placed, before it was answered.
    pub fn cancel(&self, call_id: CallId) -> KiteResult<()> {
        let tag = self.tag;
        self.op(move |switchboard, deliveries| {
            let call = switchboard
                .calls
                .get_mut(&call_id)
                .ok_or(KiteError::CallNotFound)?;
            if call.caller != tag {
                return Err(KiteError::InvalidCallState("cancel"));
            }
            if matches!(call.state, CallState::Ready | CallState::Terminated) {
                return Err(KiteError::InvalidCallState("cancel"));
            }
            call.state = CallState::Terminated;
            let callee = call.callee;
            remove_incoming(switchboard, callee, call_id);
            for target in [tag, callee] {
                switchboard.notify(deliveries, target, AgentEvent::CallTerminated { code: 487 });
            }
            Ok(())
        })
    }

    /// Terminate a ready (or early) call.
    pub fn bye(&self, call_id: CallId) -> KiteResult<()> {
        let tag = self.tag;
        self.op(move |switchboard, deliveries| {
            let call = switchboard
                .calls
                .get_mut(&call_id)
                .ok_or(KiteError::CallNotFound)?;
            if call.caller != tag && call.callee != tag {
                return Err(KiteError::CallNotFound);
            }
            if call.state == CallState::Terminated {
                return Err(KiteError::InvalidCallState("bye"));
            }
            call.state = CallState::Terminated;
            let peer = if call.caller == tag {
                call.callee
            } else {
                call.caller
            };
            remove_incoming(switchboard, peer, call_id);
            switchboard.notify(deliveries, peer, AgentEvent::CallTerminated { code: 200 });
            Ok(())
        })
    }

    /// Drop a call without signalling the peer.
    pub fn destroy(&self, call_id: CallId) -> KiteResult<()> {
        let tag = self.tag;
        self.op(move |switchboard, _| {
            let call = switchboard.calls.remove(&call_id).ok_or(KiteError::CallNotFound)?;
            let peer = if call.caller == tag {
                call.callee
            } else {
                call.caller
            };
            remove_incoming(switchboard, peer, call_id);
            Ok(())
        })
    }

    /// Renegotiate media on a ready call.
    pub fn reinvite(&self, call_id: CallId, media: &[&str]) -> KiteResult<()> {
        let tag = self.tag;
        let media: Vec<String> = media.iter().map(|m| m.to_string()).collect();
        self.op(move |switchboard, deliveries| {
            let call = switchboard
                .calls
                .get_mut(&call_id)
                .ok_or(KiteError::CallNotFound)?;
            if call.caller != tag && call.callee != tag {
                return Err(KiteError::CallNotFound);
            }
            if call.state != CallState::Ready {
                return Err(KiteError::InvalidCallState("reinvite"));
            }
            call.offered_media = media.clone();
            call.negotiated_media = media;
            let peer = if call.caller == tag {
                call.callee
            } else {
                call.caller
            };
            for target in [tag, peer] {
                switchboard.notify(
                    deliveries,
                    target,
                    AgentEvent::CallStateChanged {
                        state: CallState::Ready,
                    },
                );
            }
            Ok(())
        })
    }

    /// Refresh the session timer on a ready call.
    pub fn refresh_session(&self, call_id: CallId) -> KiteResult<u32> {
        self.op(move |switchboard, _| {
            let call = switchboard
                .calls
                .get_mut(&call_id)
                .ok_or(KiteError::CallNotFound)?;
            if call.state != CallState::Ready {
                return Err(KiteError::InvalidCallState("refresh"));
            }
            if call.session_interval.is_none() {
                return Err(KiteError::InvalidCallState("refresh"));
            }
            call.session_refreshes += 1;
            Ok(call.session_refreshes)
        })
    }

    /// Refer the call peer to another target.
    pub fn refer(&self, call_id: CallId, target: Uri) -> KiteResult<()> {
        let tag = self.tag;
        self.op(move |switchboard, deliveries| {
            let call = switchboard.calls.get(&call_id).ok_or(KiteError::CallNotFound)?;
            if call.state != CallState::Ready {
                return Err(KiteError::InvalidCallState("refer"));
            }
            let peer = if call.caller == tag {
                call.callee
            } else {
                call.caller
            };
            switchboard.notify(deliveries, peer, AgentEvent::ReferReceived { target });
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Messaging and events
    // ------------------------------------------------------------------

    /// Send an instant message to a peer agent.
    pub fn message(&self, peer: char, body: &str) -> KiteResult<()> {
        let body = body.to_string();
        self.op(move |switchboard, deliveries| {
            if !switchboard.agents.contains_key(&peer) {
                return Err(KiteError::AgentNotFound(peer));
            }
            switchboard.notify(deliveries, peer, AgentEvent::MessageReceived { body });
            Ok(())
        })
    }

    /// Subscribe to an event package published by a peer.
    pub fn subscribe(&self, peer: char, package: &str) -> KiteResult<()> {
        let tag = self.tag;
        let package = package.to_string();
        self.op(move |switchboard, _| {
            let record = switchboard
                .agents
                .get_mut(&peer)
                .ok_or(KiteError::AgentNotFound(peer))?;
            record.subscriptions.push((tag, package));
            Ok(())
        })
    }

    /// Notify this agent's subscribers of a package update.
    pub fn notify_subscribers(&self, package: &str) -> KiteResult<usize> {
        let tag = self.tag;
        let package = package.to_string();
        self.op(move |switchboard, deliveries| {
            let subscribers: Vec<char> = switchboard
                .agents
                .get(&tag)
                .ok_or(KiteError::AgentNotFound(tag))?
                .subscriptions
                .iter()
                .filter(|(_, p)| p == &package)
                .map(|(who, _)| *who)
                .collect();
            for subscriber in &subscribers {
                switchboard.notify(
                    deliveries,
                    *subscriber,
                    AgentEvent::NotifyReceived {
                        package: package.clone(),
                    },
                );
            }
            Ok(subscribers.len())
        })
    }
}

fn remove_incoming(
    switchboard: &mut crate::switchboard::Switchboard,
    tag: char,
    call_id: CallId,
) {
    if let Some(record) = switchboard.agents.get_mut(&tag) {
        record.incoming.retain(|id| *id != call_id);
    }
}
