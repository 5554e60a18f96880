//! Minimal URIs for addressing agents, relays, and proxies
//!
//! The harness only needs `scheme:host[:port]` addressing; full URI
//! grammar is the engine's concern, not ours.

use std::fmt;
use std::str::FromStr;

use crate::{KiteError, KiteResult};

/// A parsed `scheme:host[:port]` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
}

impl Uri {
    /// Parse a URI, rejecting empty scheme or host.
    pub fn parse(s: &str) -> KiteResult<Self> {
        let (scheme, rest) = s
            .split_once(':')
            .ok_or_else(|| KiteError::InvalidUri(s.to_string()))?;

        if scheme.is_empty() || rest.is_empty() {
            return Err(KiteError::InvalidUri(s.to_string()));
        }

        let (host, port) = match rest.rsplit_once(':') {
            Some((h, p)) if !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()) => {
                let port = p
                    .parse::<u16>()
                    .map_err(|_| KiteError::InvalidUri(s.to_string()))?;
                (h, Some(port))
            }
            _ => (rest, None),
        };

        if host.is_empty() {
            return Err(KiteError::InvalidUri(s.to_string()));
        }

        Ok(Uri {
            scheme: scheme.to_string(),
            host: host.to_string(),
            port,
        })
    }

}

impl FromStr for Uri {
    type Err = KiteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uri::parse(s)
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}:{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}:{}", self.scheme, self.host),
        }
    }
}
