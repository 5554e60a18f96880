//! Error types for the KITE protocol

use thiserror::Error;

use crate::Uri;

/// Core KITE errors
#[derive(Error, Debug)]
pub enum KiteError {
    // URI errors
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    // Relay errors
    #[error("Relay failed to start: {0}")]
    RelayStartFailed(String),

    #[error("Relay not running")]
    RelayNotRunning,

    #[error("No binding for {0}")]
    NoBinding(String),

    // Registration errors
    #[error("Registration rejected: {code}")]
    RegistrationRejected { code: u16 },

    #[error("Not registered")]
    NotRegistered,

    // Call errors
    #[error("Peer unreachable: {0}")]
    Unreachable(Uri),

    #[error("Call rejected: {code}")]
    CallRejected { code: u16 },

    #[error("No such call")]
    CallNotFound,

    #[error("Call is not in a state that allows {0}")]
    InvalidCallState(&'static str),

    // Engine errors
    #[error("Engine already stopped")]
    EngineStopped,

    #[error("Agent '{0}' already exists")]
    AgentExists(char),

    #[error("No agent with tag '{0}'")]
    AgentNotFound(char),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type for KITE operations
pub type KiteResult<T> = Result<T, KiteError>;
