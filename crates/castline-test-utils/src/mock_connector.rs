//! Scripted in-process transport
//!
//! Every request type answers with whatever was scripted for it; anything
//! unscripted is rejected as an unknown request, like a real server would.

use async_trait::async_trait;
use castline_core::protocol::status;
use castline_core::{request, ConnectionTarget};
use castline_transport::{
    Connector, Result, RpcConnection, TransportError, TransportEvent, TransportReceiver,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// Scripted answer for a request type
#[derive(Debug, Clone)]
pub enum MockReply {
    Ok(Value),
    Reject { code: u32, message: String },
    Fail(TransportError),
    /// Answers only when the connection dies
    Hang,
}

#[derive(Default)]
struct Liveness {
    live: AtomicBool,
    closed: Notify,
}

impl Liveness {
    /// Returns whether it was live
    fn kill(&self) -> bool {
        let was_live = self.live.swap(false, Ordering::SeqCst);
        self.closed.notify_waiters();
        was_live
    }
}

#[derive(Default)]
struct MockState {
    refused: Mutex<HashSet<String>>,
    attempts: Mutex<Vec<ConnectionTarget>>,
    replies: Mutex<HashMap<String, MockReply>>,
    calls: Mutex<Vec<(String, Option<Value>)>>,
    events: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
    live: Mutex<Option<Arc<Liveness>>>,
    connect_delay: Mutex<Option<Duration>>,
}

/// In-process [`Connector`] driven by a script
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl MockConnector {
    /// Accepts every address; no request is scripted
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports itself as OBS Studio and accepts the 5.x commands
    pub fn obs() -> Self {
        Self::new()
            .with_vendor("OBS Studio")
            .accepting(&[
                request::START_STREAM,
                request::STOP_STREAM,
                request::SET_CURRENT_PROGRAM_SCENE,
            ])
    }

    /// Reports itself as Streamlabs Desktop; no command is scripted
    pub fn streamlabs() -> Self {
        Self::new().with_vendor("Streamlabs Desktop")
    }

    /// Script `GetVersion` to report this vendor
    pub fn with_vendor(self, vendor: &str) -> Self {
        self.respond(
            request::GET_VERSION,
            json!({ "vendorName": vendor, "obsVersion": "30.1.2", "rpcVersion": 1 }),
        );
        self
    }

    /// Script each request type to succeed with no data
    pub fn accepting(self, request_types: &[&str]) -> Self {
        for request_type in request_types {
            self.respond(request_type, Value::Null);
        }
        self
    }

    /// Refuse connections to this address
    pub fn refuse(&self, address: &str) {
        self.state.refused.lock().insert(address.to_string());
    }

    /// Delay every connect attempt
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.state.connect_delay.lock() = Some(delay);
    }

    pub fn respond(&self, request_type: &str, data: Value) {
        self.script(request_type, MockReply::Ok(data));
    }

    pub fn reject(&self, request_type: &str, code: u32, message: &str) {
        self.script(
            request_type,
            MockReply::Reject {
                code,
                message: message.to_string(),
            },
        );
    }

    pub fn script(&self, request_type: &str, reply: MockReply) {
        self.state
            .replies
            .lock()
            .insert(request_type.to_string(), reply);
    }

    /// Every address a connect was attempted against, in order
    pub fn attempts(&self) -> Vec<String> {
        self.state
            .attempts
            .lock()
            .iter()
            .map(|t| t.address.clone())
            .collect()
    }

    pub fn attempt_targets(&self) -> Vec<ConnectionTarget> {
        self.state.attempts.lock().clone()
    }

    /// Request types issued, in order
    pub fn call_types(&self) -> Vec<String> {
        self.state
            .calls
            .lock()
            .iter()
            .map(|(t, _)| t.clone())
            .collect()
    }

    /// Request types and data issued, in order
    pub fn calls(&self) -> Vec<(String, Option<Value>)> {
        self.state.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().len()
    }

    pub fn clear_calls(&self) {
        self.state.calls.lock().clear();
    }

    /// Whether the most recent connection is still open
    pub fn connection_live(&self) -> bool {
        self.state
            .live
            .lock()
            .as_ref()
            .map(|live| live.live.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Push an event on the most recent connection
    pub fn emit(&self, event: TransportEvent) -> bool {
        match self.state.events.lock().as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Drop the most recent connection from the far side. Calls still
    /// waiting on it fail with `ConnectionClosed`.
    pub fn drop_connection(&self, reason: &str) {
        if let Some(live) = self.state.live.lock().as_ref() {
            live.kill();
        }
        self.emit(TransportEvent::Closed {
            reason: Some(reason.to_string()),
        });
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Connection = MockConnection;
    type Receiver = MockReceiver;

    async fn connect(
        &self,
        target: &ConnectionTarget,
    ) -> Result<(Self::Connection, Self::Receiver)> {
        self.state.attempts.lock().push(target.clone());

        let delay = *self.state.connect_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.state.refused.lock().contains(&target.address) {
            return Err(TransportError::ConnectionFailed(format!(
                "{} refused the connection",
                target.address
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(TransportEvent::Opened);
        let live = Arc::new(Liveness {
            live: AtomicBool::new(true),
            closed: Notify::new(),
        });

        *self.state.events.lock() = Some(tx.clone());
        *self.state.live.lock() = Some(live.clone());

        let connection = MockConnection {
            state: self.state.clone(),
            live,
            events: tx,
        };
        Ok((connection, MockReceiver { rx }))
    }
}

/// Call handle produced by [`MockConnector`]
pub struct MockConnection {
    state: Arc<MockState>,
    live: Arc<Liveness>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

#[async_trait]
impl RpcConnection for MockConnection {
    async fn call(&self, request_type: &str, request_data: Option<Value>) -> Result<Value> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        self.state
            .calls
            .lock()
            .push((request_type.to_string(), request_data));

        let reply = self.state.replies.lock().get(request_type).cloned();
        match reply {
            Some(MockReply::Ok(value)) => Ok(value),
            Some(MockReply::Reject { code, message }) => Err(TransportError::Rpc { code, message }),
            Some(MockReply::Fail(err)) => Err(err),
            Some(MockReply::Hang) => {
                let closed = self.live.closed.notified();
                if self.is_connected() {
                    closed.await;
                }
                Err(TransportError::ConnectionClosed)
            }
            None => Err(TransportError::Rpc {
                code: status::UNKNOWN_REQUEST_TYPE,
                message: format!("Unknown request type: {}", request_type),
            }),
        }
    }

    fn is_connected(&self) -> bool {
        self.live.live.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        if self.live.kill() {
            let _ = self.events.send(TransportEvent::Closed {
                reason: Some("closed by client".to_string()),
            });
        }
        Ok(())
    }
}

/// Event receiver produced by [`MockConnector`]
pub struct MockReceiver {
    rx: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for MockReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}
