//! Castline Transport Layer
//!
//! The control-plane transport client: opens one RPC-over-WebSocket
//! connection, issues named requests, and surfaces lifecycle and push
//! events on a channel.
//!
//! - [`Connector`] opens a connection and hands back a call handle plus an event receiver
//! - [`RpcConnection`] issues requests on a live connection
//! - [`WebSocketConnector`] speaks obs-websocket 5.x (OBS Studio, Streamlabs Desktop)

pub mod error;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use error::{Result, TransportError};
pub use traits::{Connector, RpcConnection, TransportEvent, TransportReceiver, NOT_CONNECTED};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketConnection, WebSocketConnector, WebSocketReceiver};
