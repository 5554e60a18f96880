//! Observable agent events
//!
//! Every externally observable thing an agent does is reported as an
//! `AgentEvent` to the endpoint's event sink, when one is wired. A
//! missing sink means events are discarded.

use std::fmt;
use std::sync::Arc;

use crate::Uri;

/// Call lifecycle states as seen by the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Calling,
    Proceeding,
    Early,
    Ready,
    Terminating,
    Terminated,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Calling => "calling",
            CallState::Proceeding => "proceeding",
            CallState::Early => "early",
            CallState::Ready => "ready",
            CallState::Terminating => "terminating",
            CallState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// An observable protocol event belonging to one agent.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    RegisterOk { registrar: Uri },
    RegisterFailed { code: u16 },
    Unregistered,
    IncomingCall { from: Uri },
    CallStateChanged { state: CallState },
    CallTerminated { code: u16 },
    Redirected { target: Uri },
    AuthChallenge { realm: String },
    ReferReceived { target: Uri },
    MessageReceived { body: String },
    NotifyReceived { package: String },
    Shutdown,
}

impl AgentEvent {
    /// Short label used by event printers.
    pub fn label(&self) -> &'static str {
        match self {
            AgentEvent::RegisterOk { .. } => "register-ok",
            AgentEvent::RegisterFailed { .. } => "register-failed",
            AgentEvent::Unregistered => "unregistered",
            AgentEvent::IncomingCall { .. } => "incoming-call",
            AgentEvent::CallStateChanged { .. } => "call-state",
            AgentEvent::CallTerminated { .. } => "call-terminated",
            AgentEvent::Redirected { .. } => "redirected",
            AgentEvent::AuthChallenge { .. } => "auth-challenge",
            AgentEvent::ReferReceived { .. } => "refer",
            AgentEvent::MessageReceived { .. } => "message",
            AgentEvent::NotifyReceived { .. } => "notify",
            AgentEvent::Shutdown => "shutdown",
        }
    }
}

/// Callback invoked for every observable event of one endpoint.
///
/// The first argument is the event, the second a textual label naming
/// the endpoint the event belongs to.
pub type EventSink = Arc<dyn Fn(&AgentEvent, &str) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_are_stable() {
        let uri = Uri::parse("kite:a.example.com").unwrap();
        assert_eq!(AgentEvent::RegisterOk { registrar: uri }.label(), "register-ok");
        assert_eq!(AgentEvent::Shutdown.label(), "shutdown");
    }

    #[test]
    fn call_states_display() {
        assert_eq!(CallState::Ready.to_string(), "ready");
        assert_eq!(CallState::Terminated.to_string(), "terminated");
    }
}
