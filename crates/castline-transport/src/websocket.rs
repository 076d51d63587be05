//! obs-websocket 5.x transport over WebSocket
//!
//! One reader task and one writer task per connection. Requests are
//! correlated to responses by `requestId`; push events and the final close
//! are delivered on the receiver.

use async_trait::async_trait;
use castline_core::protocol::{
    self, close_code, event, ClientMessage, Identify, Request, RequestResponse, ServerMessage,
};
use castline_core::ConnectionTarget;
use dashmap::DashMap;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        protocol::{CloseFrame, Message as WsMessage},
        Error as WsError,
    },
};
use tracing::{debug, error, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::{Connector, RpcConnection, TransportEvent, TransportReceiver};

type PendingRequests = DashMap<String, oneshot::Sender<Result<Value>>>;

/// WebSocket configuration
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Event subscription bitmask for `Identify`; `None` leaves the server default
    pub event_subscriptions: Option<u32>,
    /// Capacity of the outgoing frame channel. Events are never bounded:
    /// the reader also routes responses and must not wait on a slow consumer.
    pub channel_capacity: usize,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            event_subscriptions: None,
            channel_capacity: 100,
        }
    }
}

/// Opens obs-websocket connections
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: WebSocketConfig,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: WebSocketConfig) -> Self {
        Self { config }
    }
}

/// Call handle for an identified connection
pub struct WebSocketConnection {
    address: String,
    tx: mpsc::Sender<WsMessage>,
    events: mpsc::UnboundedSender<TransportEvent>,
    pending: Arc<PendingRequests>,
    connected: Arc<Mutex<bool>>,
    next_id: AtomicU64,
}

impl WebSocketConnection {
    /// The address this connection was opened against
    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Removes a pending entry if the caller stops waiting
struct PendingGuard<'a> {
    pending: &'a PendingRequests,
    request_id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.request_id);
    }
}

#[async_trait]
impl RpcConnection for WebSocketConnection {
    async fn call(&self, request_type: &str, request_data: Option<Value>) -> Result<Value> {
        if !self.is_connected() {
            let _ = self.events.send(TransportEvent::not_connected(format!(
                "{} issued on a closed connection",
                request_type
            )));
            return Err(TransportError::NotConnected);
        }

        let request_id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let frame = ClientMessage::Request(Request {
            request_type: request_type.to_string(),
            request_id: request_id.clone(),
            request_data,
        })
        .encode()?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);
        let _guard = PendingGuard {
            pending: &self.pending,
            request_id: request_id.clone(),
        };

        // The reader clears the table after flipping the flag
        if !self.is_connected() {
            return Err(TransportError::ConnectionClosed);
        }

        self.tx
            .send(WsMessage::Text(frame))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        debug!("-> {} ({})", request_type, request_id);

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(TransportError::ConnectionClosed),
        }
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    async fn close(&self) -> Result<()> {
        let was_connected = std::mem::replace(&mut *self.connected.lock(), false);
        if was_connected {
            debug!("Closing connection to {}", self.address);
            let _ = self.tx.send(WsMessage::Close(None)).await;
        }
        self.pending.clear();
        Ok(())
    }
}

/// Event receiver for a connection
pub struct WebSocketReceiver {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for WebSocketReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Connection = WebSocketConnection;
    type Receiver = WebSocketReceiver;

    async fn connect(
        &self,
        target: &ConnectionTarget,
    ) -> Result<(Self::Connection, Self::Receiver)> {
        validate_url(&target.address)?;
        info!("Connecting to {}", target.address);

        let (ws_stream, response) = connect_async(target.address.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!("WebSocket connected, response: {:?}", response.status());

        let (mut write, mut read) = ws_stream.split();

        let rpc_version = handshake(
            &mut write,
            &mut read,
            target.password.as_deref(),
            &self.config,
        )
        .await?;

        info!("Identified with {} (rpc v{})", target.address, rpc_version);

        let capacity = self.config.channel_capacity;
        let (send_tx, mut send_rx) = mpsc::channel::<WsMessage>(capacity);
        let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();

        let connected = Arc::new(Mutex::new(true));
        let pending: Arc<PendingRequests> = Arc::new(DashMap::new());

        // Spawn writer task
        let connected_write = connected.clone();
        tokio::spawn(async move {
            let mut write = write;
            while let Some(msg) = send_rx.recv().await {
                let closing = matches!(msg, WsMessage::Close(_));
                if let Err(e) = write.send(msg).await {
                    error!("WebSocket write error: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            *connected_write.lock() = false;
        });

        // Spawn reader task
        let events = event_tx.clone();
        let pending_read = pending.clone();
        let connected_read = connected.clone();
        tokio::spawn(async move {
            let _ = events.send(TransportEvent::Opened);

            let reason = read_loop(read, &events, &pending_read).await;

            *connected_read.lock() = false;
            // Dropping the senders fails every waiting call
            pending_read.clear();

            info!("WebSocket closed: {:?}", reason);
            let _ = events.send(TransportEvent::Closed { reason });
        });

        let connection = WebSocketConnection {
            address: target.address.clone(),
            tx: send_tx,
            events: event_tx,
            pending,
            connected,
            next_id: AtomicU64::new(1),
        };

        Ok((connection, WebSocketReceiver { rx: event_rx }))
    }
}

/// Only `ws://` and `wss://` URLs are accepted
fn validate_url(address: &str) -> Result<url::Url> {
    let url = url::Url::parse(address)
        .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", address, e)))?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(TransportError::InvalidUrl(format!(
            "{}: unsupported scheme '{}'",
            address, other
        ))),
    }
}

/// Hello -> Identify -> Identified. Returns the negotiated RPC version.
async fn handshake<W, R>(
    write: &mut W,
    read: &mut R,
    password: Option<&str>,
    config: &WebSocketConfig,
) -> Result<u32>
where
    W: Sink<WsMessage, Error = WsError> + Unpin,
    R: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
    let hello = match next_server_message(read).await? {
        ServerMessage::Hello(hello) => hello,
        other => {
            return Err(TransportError::Protocol(format!(
                "expected Hello, got {:?}",
                other
            )))
        }
    };

    debug!(
        "Server speaks obs-websocket {} (rpc v{})",
        hello.obs_web_socket_version, hello.rpc_version
    );

    let authentication = match (&hello.authentication, password) {
        (Some(challenge), Some(password)) => Some(protocol::auth_response(
            password,
            &challenge.salt,
            &challenge.challenge,
        )),
        (Some(_), None) => {
            let _ = write.send(WsMessage::Close(None)).await;
            return Err(TransportError::AuthenticationFailed(
                "server requires a password but none was provided".to_string(),
            ));
        }
        (None, _) => None,
    };

    let identify = ClientMessage::Identify(Identify {
        rpc_version: protocol::RPC_VERSION,
        authentication,
        event_subscriptions: config.event_subscriptions,
    })
    .encode()?;

    write.send(WsMessage::Text(identify)).await?;

    match next_server_message(read).await? {
        ServerMessage::Identified(identified) => Ok(identified.negotiated_rpc_version),
        other => Err(TransportError::Protocol(format!(
            "expected Identified, got {:?}",
            other
        ))),
    }
}

async fn next_server_message<R>(read: &mut R) -> Result<ServerMessage>
where
    R: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
    while let Some(frame) = read.next().await {
        match frame? {
            WsMessage::Text(text) => return Ok(ServerMessage::decode(&text)?),
            WsMessage::Close(frame) => return Err(handshake_close(frame)),
            _ => continue,
        }
    }
    Err(TransportError::ConnectionClosed)
}

fn handshake_close(frame: Option<CloseFrame<'_>>) -> TransportError {
    match frame {
        Some(f) if u16::from(f.code) == close_code::AUTHENTICATION_FAILED => {
            TransportError::AuthenticationFailed(f.reason.to_string())
        }
        Some(f) => TransportError::ConnectionFailed(format!(
            "closed during handshake ({}): {}",
            u16::from(f.code),
            f.reason
        )),
        None => TransportError::ConnectionClosed,
    }
}

/// Runs until the socket closes; returns the close reason
async fn read_loop<R>(
    mut read: R,
    events: &mpsc::UnboundedSender<TransportEvent>,
    pending: &PendingRequests,
) -> Option<String>
where
    R: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
{
    while let Some(result) = read.next().await {
        match result {
            Ok(WsMessage::Text(text)) => match ServerMessage::decode(&text) {
                Ok(ServerMessage::RequestResponse(response)) => complete(pending, response),
                Ok(ServerMessage::Event(ev)) => {
                    let _ = events.send(map_event(ev));
                }
                Ok(other) => debug!("Ignoring {:?} after identification", other),
                Err(e) => warn!("Decode error: {}", e),
            },
            Ok(WsMessage::Close(frame)) => return frame.map(|f| f.reason.to_string()),
            Ok(WsMessage::Binary(_)) => warn!("Ignoring binary frame"),
            Ok(_) => {}
            Err(e) => {
                error!("WebSocket read error: {}", e);
                return Some(e.to_string());
            }
        }
    }
    None
}

fn complete(pending: &PendingRequests, response: RequestResponse) {
    let request_id = response.request_id.clone();
    match pending.remove(&request_id) {
        Some((_, tx)) => {
            let result = response.into_result().map_err(|status| TransportError::Rpc {
                code: status.code,
                message: status
                    .comment
                    .unwrap_or_else(|| format!("error code {}", status.code)),
            });
            let _ = tx.send(result);
        }
        None => debug!("Response for unknown request {}", request_id),
    }
}

fn map_event(ev: protocol::Event) -> TransportEvent {
    if ev.event_type == event::STREAM_STATE_CHANGED {
        let active = ev
            .event_data
            .as_ref()
            .and_then(|d| d.get("outputActive"))
            .and_then(Value::as_bool);
        if let Some(active) = active {
            return TransportEvent::StreamStateChanged { active };
        }
    }
    TransportEvent::Other {
        event_type: ev.event_type,
        data: ev.event_data,
    }
}
