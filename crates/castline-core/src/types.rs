//! Session domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DEFAULT_PRIMARY_ADDRESS;

/// Broadcast software on the far end of the control connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SoftwareVariant {
    /// OBS Studio, speaking obs-websocket 5.x natively
    #[serde(rename = "OBS")]
    Obs,
    /// Streamlabs Desktop, which accepts some pre-5.x request names
    Streamlabs,
    /// Not connected, or classification failed
    #[default]
    Unknown,
}

impl SoftwareVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            SoftwareVariant::Obs => "OBS",
            SoftwareVariant::Streamlabs => "Streamlabs",
            SoftwareVariant::Unknown => "Unknown",
        }
    }

    /// Whether commands rejected by this variant get one retry under the legacy name
    pub fn accepts_alternate_calls(&self) -> bool {
        matches!(self, SoftwareVariant::Streamlabs)
    }
}

impl fmt::Display for SoftwareVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published lifecycle state of the control session
///
/// `Streaming` implies `Connected`, which implies a live session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Disconnected,
    Connected,
    Streaming,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        !matches!(self, SessionState::Disconnected)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, SessionState::Streaming)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "disconnected",
            SessionState::Connected => "connected",
            SessionState::Streaming => "streaming",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address and credentials for a single connect attempt
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    pub address: String,
    pub password: Option<String>,
}

impl ConnectionTarget {
    /// Create a target. An empty password is the same as no password.
    pub fn new(address: &str, password: Option<&str>) -> Self {
        Self {
            address: address.to_string(),
            password: password.filter(|p| !p.is_empty()).map(str::to_string),
        }
    }

    /// Whether this target is exactly the documented primary default
    pub fn is_default_primary(&self) -> bool {
        self.address == DEFAULT_PRIMARY_ADDRESS
    }

    /// Same credentials, different address
    pub fn with_address(&self, address: &str) -> Self {
        Self {
            address: address.to_string(),
            password: self.password.clone(),
        }
    }
}

impl Default for ConnectionTarget {
    fn default() -> Self {
        Self::new(DEFAULT_PRIMARY_ADDRESS, None)
    }
}

// Keep passwords out of logs
impl fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("address", &self.address)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
