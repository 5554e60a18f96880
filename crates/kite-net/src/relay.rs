//! Internal relay
//!
//! A deterministic in-process registrar/forwarder. Agents bind an
//! address-of-record to their location; lookups resolve through the
//! binding table. The relay can demand authentication, which the
//! challenge scenarios toggle transiently.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use kite_core::{KiteError, KiteResult, Uri};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Domain the relay serves.
    pub domain: String,
    /// Realm to challenge with; `None` accepts unauthenticated binds.
    pub auth_realm: Option<String>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            domain: "test.example.org".to_string(),
            auth_realm: None,
        }
    }
}

/// Credentials presented when binding against a challenging relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub realm: String,
    pub user: String,
    pub secret: String,
}

/// A running internal relay.
pub struct Relay {
    uri: Uri,
    state: Mutex<RelayState>,
}

struct RelayState {
    running: bool,
    auth_realm: Option<String>,
    bindings: HashMap<String, Uri>,
}

impl Relay {
    /// Start a relay for the configured domain.
    pub fn start(config: RelayConfig) -> KiteResult<Self> {
        if config.domain.is_empty() {
            return Err(KiteError::RelayStartFailed("empty domain".to_string()));
        }

        let uri = Uri::parse(&format!("kite:{}", config.domain))?;
        debug!(target: "kite", relay = %uri, "relay started");

        Ok(Self {
            uri,
            state: Mutex::new(RelayState {
                running: true,
                auth_realm: config.auth_realm,
                bindings: HashMap::new(),
            }),
        })
    }

    /// Resolved address of this relay.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Change the challenge realm. `None` disables authentication.
    pub fn set_auth_realm(&self, realm: Option<String>) {
        self.state.lock().auth_realm = realm;
    }

    /// Bind an address-of-record to a location.
    ///
    /// Returns 401 when the relay challenges and the credentials are
    /// missing or for the wrong realm, 403 when the secret is wrong.
    pub fn bind(
        &self,
        aor: &str,
        location: Uri,
        credentials: Option<&Credentials>,
    ) -> KiteResult<()> {
        let mut state = self.state.lock();
        if !state.running {
            return Err(KiteError::RelayNotRunning);
        }

        if let Some(realm) = &state.auth_realm {
            match credentials {
                None => return Err(KiteError::RegistrationRejected { code: 401 }),
                Some(c) if &c.realm != realm => {
                    return Err(KiteError::RegistrationRejected { code: 401 });
                }
                Some(c) if c.secret.is_empty() => {
                    return Err(KiteError::RegistrationRejected { code: 403 });
                }
                Some(_) => {}
            }
        }

        debug!(target: "kite", aor, location = %location, "relay bind");
        state.bindings.insert(aor.to_string(), location);
        Ok(())
    }

    /// Resolve an address-of-record to its bound location.
    pub fn lookup(&self, aor: &str) -> KiteResult<Uri> {
        let state = self.state.lock();
        if !state.running {
            return Err(KiteError::RelayNotRunning);
        }
        state
            .bindings
            .get(aor)
            .cloned()
            .ok_or_else(|| KiteError::NoBinding(aor.to_string()))
    }

    /// Remove a binding.
    pub fn unbind(&self, aor: &str) -> KiteResult<()> {
        let mut state = self.state.lock();
        if !state.running {
            return Err(KiteError::RelayNotRunning);
        }
        state.bindings.remove(aor);
        Ok(())
    }

    /// Number of live bindings.
    pub fn binding_count(&self) -> usize {
        self.state.lock().bindings.len()
    }

    /// Stop the relay. Further binds and lookups fail.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        state.bindings.clear();
        debug!(target: "kite", relay = %self.uri, "relay stopped");
    }
}
