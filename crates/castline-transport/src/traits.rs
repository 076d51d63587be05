//! Transport trait definitions

use async_trait::async_trait;
use castline_core::ConnectionTarget;
use serde_json::Value;

use crate::error::Result;

/// Error code carried by [`TransportEvent::Error`] when the socket is gone
pub const NOT_CONNECTED: &str = "NOT_CONNECTED";

/// Events that can occur on a connection
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Connection identified and ready for requests
    Opened,
    /// Connection closed (clean or error)
    Closed { reason: Option<String> },
    /// The stream output started or stopped
    StreamStateChanged { active: bool },
    /// Transport-level error
    Error { code: String, message: String },
    /// Any other push event, passed through untyped
    Other {
        event_type: String,
        data: Option<Value>,
    },
}

impl TransportEvent {
    pub fn not_connected(message: impl Into<String>) -> Self {
        TransportEvent::Error {
            code: NOT_CONNECTED.to_string(),
            message: message.into(),
        }
    }

    /// Whether this event means the connection can no longer carry requests
    pub fn is_not_connected(&self) -> bool {
        matches!(self, TransportEvent::Error { code, .. } if code == NOT_CONNECTED)
    }
}

/// A live connection that carries requests
#[async_trait]
pub trait RpcConnection: Send + Sync {
    /// Issue a request and wait for its response data
    async fn call(&self, request_type: &str, request_data: Option<Value>) -> Result<Value>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Close the connection. Safe to call more than once.
    async fn close(&self) -> Result<()>;
}

/// Trait for receiving connection events
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event; `None` once the connection is gone
    async fn recv(&mut self) -> Option<TransportEvent>;
}

/// Opens connections
#[async_trait]
pub trait Connector: Send + Sync {
    /// The call handle for this transport
    type Connection: RpcConnection + 'static;
    /// The event receiver for this transport
    type Receiver: TransportReceiver + 'static;

    /// Connect and complete the handshake
    async fn connect(&self, target: &ConnectionTarget)
        -> Result<(Self::Connection, Self::Receiver)>;
}
