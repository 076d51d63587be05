//! Streaming-control session manager
//!
//! Owns the single control connection to OBS Studio or Streamlabs Desktop.
//! Connects with a one-shot fallback between the two default addresses,
//! classifies the software that answered, and maps every command onto the
//! request names that software understands.

use async_trait::async_trait;
use castline_core::{
    CommandReply, ConnectionTarget, RemoteCommand, Scene, SessionState, SoftwareVariant,
    DEFAULT_SECONDARY_ADDRESS,
};
use castline_transport::{
    Connector, RpcConnection, TransportError, TransportEvent, TransportReceiver,
    WebSocketConnector,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::builder::{SessionConfig, SessionManagerBuilder};
use crate::classifier::{Classifier, VendorClassifier};
use crate::error::{ClientError, Result};
use crate::publisher::{StatePublisher, StateSubscriber};

/// The live connection, if any, and what is known about it
struct Session<T> {
    handle: Option<Arc<T>>,
    variant: SoftwareVariant,
    address: Option<String>,
    /// Bumped on every successful connect
    generation: u64,
}

impl<T> Session<T> {
    fn reset(&mut self) -> Option<Arc<T>> {
        self.variant = SoftwareVariant::Unknown;
        self.address = None;
        self.handle.take()
    }
}

/// State shared with the event pump. The session and the published state
/// only change together, under `session`.
struct Shared<T> {
    session: Mutex<Session<T>>,
    publisher: StatePublisher,
}

impl<T> Shared<T> {
    /// Apply a push event. Returns false once this generation is finished.
    fn apply(&self, generation: u64, event: TransportEvent) -> bool {
        let mut session = self.session.lock();
        if session.generation != generation || session.handle.is_none() {
            debug!("Dropping event from finished session {}: {:?}", generation, event);
            return false;
        }

        match event {
            TransportEvent::Opened => {
                debug!("Session {} opened", generation);
            }
            TransportEvent::Closed { reason } => {
                info!("Connection closed: {}", reason.as_deref().unwrap_or("no reason"));
                session.reset();
                self.publisher.publish(SessionState::Disconnected);
                return false;
            }
            ref lost if lost.is_not_connected() => {
                warn!("Transport lost: {:?}", lost);
                session.reset();
                self.publisher.publish(SessionState::Disconnected);
                return false;
            }
            TransportEvent::Error { code, message } => {
                warn!("Transport error {}: {}", code, message);
            }
            TransportEvent::StreamStateChanged { active } => {
                if self.publisher.current().is_connected() {
                    let next = if active {
                        SessionState::Streaming
                    } else {
                        SessionState::Connected
                    };
                    if self.publisher.publish(next) {
                        info!("Stream {}", if active { "started" } else { "stopped" });
                    }
                }
            }
            TransportEvent::Other { event_type, .. } => {
                debug!("Ignoring event {}", event_type);
            }
        }
        true
    }
}

/// Drives one connection's events into the shared state until it ends
async fn pump_events<T, R>(shared: Arc<Shared<T>>, generation: u64, mut receiver: R)
where
    T: Send + Sync,
    R: TransportReceiver,
{
    while let Some(event) = receiver.recv().await {
        if !shared.apply(generation, event) {
            break;
        }
    }
    debug!("Event pump for session {} stopped", generation);
}

/// Bounds every call on the wrapped connection by an optional deadline
struct Bounded<'a> {
    inner: &'a dyn RpcConnection,
    limit: Option<Duration>,
}

#[async_trait]
impl<'a> RpcConnection for Bounded<'a> {
    async fn call(
        &self,
        request_type: &str,
        request_data: Option<Value>,
    ) -> castline_transport::Result<Value> {
        let call = self.inner.call(request_type, request_data);
        match self.limit {
            Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
                warn!("{} timed out after {:?}", request_type, limit);
                TransportError::Timeout
            })?,
            None => call.await,
        }
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    async fn close(&self) -> castline_transport::Result<()> {
        self.inner.close().await
    }
}

/// Clears the in-flight flag when a connect attempt ends, however it ends
struct ConnectingGuard<'a>(&'a AtomicBool);

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Holds an opened connection until it is installed in the session.
/// Closes it if the connect attempt is dropped before that.
struct PendingConnection<T: RpcConnection + 'static> {
    connection: Arc<T>,
    installed: bool,
}

impl<T: RpcConnection + 'static> PendingConnection<T> {
    fn new(connection: T) -> Self {
        Self {
            connection: Arc::new(connection),
            installed: false,
        }
    }

    fn install(mut self) -> Arc<T> {
        self.installed = true;
        self.connection.clone()
    }
}

impl<T: RpcConnection + 'static> Drop for PendingConnection<T> {
    fn drop(&mut self) {
        if self.installed {
            return;
        }
        let connection = self.connection.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!("Connect abandoned, closing the opened connection");
                runtime.spawn(async move {
                    if let Err(e) = connection.close().await {
                        debug!("Close after abandoned connect failed: {}", e);
                    }
                });
            }
            Err(_) => warn!("Connect abandoned outside a runtime, connection left to drop"),
        }
    }
}

/// Session manager for a single streaming-software connection
///
/// Commands come in two flavors: the plain ones (`start_streaming`, ...)
/// report success as a `bool` and never fail loudly, the `try_*` ones
/// return the reason.
pub struct SessionManager<C: Connector = WebSocketConnector> {
    connector: C,
    config: SessionConfig,
    classifier: Arc<dyn Classifier>,
    shared: Arc<Shared<C::Connection>>,
    connecting: AtomicBool,
}

impl SessionManager<WebSocketConnector> {
    /// Manager over obs-websocket with default settings
    pub fn new() -> Self {
        Self::with_connector(WebSocketConnector::new())
    }

    pub fn builder() -> SessionManagerBuilder<WebSocketConnector> {
        SessionManagerBuilder::new()
    }
}

impl Default for SessionManager<WebSocketConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> SessionManager<C> {
    pub fn with_connector(connector: C) -> Self {
        Self::from_parts(
            connector,
            SessionConfig::default(),
            Arc::new(VendorClassifier::default()),
        )
    }

    pub(crate) fn from_parts(
        connector: C,
        config: SessionConfig,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            connector,
            config,
            classifier,
            shared: Arc::new(Shared {
                session: Mutex::new(Session {
                    handle: None,
                    variant: SoftwareVariant::Unknown,
                    address: None,
                    generation: 0,
                }),
                publisher: StatePublisher::new(),
            }),
            connecting: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Connect and classify; `false` on any failure.
    ///
    /// A live session is never replaced: connecting again while connected
    /// returns `false`. Call [`disconnect`](Self::disconnect) first to move
    /// to another address.
    pub async fn connect(&self, address: &str, password: Option<&str>) -> bool {
        match self.try_connect(ConnectionTarget::new(address, password)).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Connect failed: {}", e);
                false
            }
        }
    }

    /// Connect to `target`, falling back once to the Streamlabs default
    /// when `target` is the OBS default and cannot be reached.
    ///
    /// Fails with [`ClientError::AlreadyConnected`] while a session is live.
    /// If the returned future is dropped before it completes, a connection
    /// it already opened is closed.
    pub async fn try_connect(&self, target: ConnectionTarget) -> Result<SoftwareVariant> {
        if self.connecting.swap(true, Ordering::SeqCst) {
            return Err(ClientError::ConnectInProgress);
        }
        let _guard = ConnectingGuard(&self.connecting);

        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }

        let (target, connection, receiver) = self.open(target).await?;
        let pending = PendingConnection::new(connection);

        let variant = self.classifier.classify(&self.bounded(pending.connection.as_ref())).await;

        let generation = {
            let mut session = self.shared.session.lock();
            session.generation += 1;
            session.handle = Some(pending.install());
            session.variant = variant;
            session.address = Some(target.address.clone());
            self.shared.publisher.publish(SessionState::Connected);
            session.generation
        };

        tokio::spawn(pump_events(self.shared.clone(), generation, receiver));

        info!("Connected to {} at {}", variant, target.address);
        Ok(variant)
    }

    async fn open(
        &self,
        target: ConnectionTarget,
    ) -> Result<(ConnectionTarget, C::Connection, C::Receiver)> {
        match self.attempt(&target).await {
            Ok((connection, receiver)) => Ok((target, connection, receiver)),
            Err(e) if target.is_default_primary() => {
                warn!(
                    "{} unreachable ({}), trying {}",
                    target.address, e, DEFAULT_SECONDARY_ADDRESS
                );
                let fallback = target.with_address(DEFAULT_SECONDARY_ADDRESS);
                let (connection, receiver) = self.attempt(&fallback).await?;
                Ok((fallback, connection, receiver))
            }
            Err(e) => Err(e),
        }
    }

    async fn attempt(&self, target: &ConnectionTarget) -> Result<(C::Connection, C::Receiver)> {
        debug!("Connecting to {}", target.address);
        let connecting = self.connector.connect(target);
        let outcome = match self.config.connect_timeout {
            Some(limit) => match tokio::time::timeout(limit, connecting).await {
                Ok(outcome) => outcome,
                Err(_) => Err(TransportError::Timeout),
            },
            None => connecting.await,
        };
        outcome.map_err(|source| ClientError::ConnectionFailed {
            address: target.address.clone(),
            source,
        })
    }

    /// Close the session if there is one. Safe to call at any time.
    pub async fn disconnect(&self) {
        let handle = {
            let mut session = self.shared.session.lock();
            let handle = session.reset();
            self.shared.publisher.publish(SessionState::Disconnected);
            handle
        };

        if let Some(handle) = handle {
            info!("Disconnecting");
            if let Err(e) = handle.close().await {
                warn!("Error while closing connection: {}", e);
            }
        }
    }

    // ------------------------------------------------------------------
    // Commands
    // ------------------------------------------------------------------

    pub async fn start_streaming(&self) -> bool {
        report("start streaming", self.try_start_streaming().await)
    }

    pub async fn stop_streaming(&self) -> bool {
        report("stop streaming", self.try_stop_streaming().await)
    }

    pub async fn set_current_scene(&self, name: &str) -> bool {
        report("set scene", self.try_set_current_scene(name).await)
    }

    /// Scenes in the current collection; empty on any failure
    pub async fn get_scenes(&self) -> Vec<Scene> {
        match self.try_get_scenes().await {
            Ok(scenes) => scenes,
            Err(e) => {
                warn!("Could not list scenes: {}", e);
                Vec::new()
            }
        }
    }

    /// Success only means the request was accepted. The published state
    /// moves to `Streaming` when the software reports the output started.
    pub async fn try_start_streaming(&self) -> Result<()> {
        self.dispatch(RemoteCommand::StartStream).await.map(drop)
    }

    pub async fn try_stop_streaming(&self) -> Result<()> {
        self.dispatch(RemoteCommand::StopStream).await.map(drop)
    }

    pub async fn try_set_current_scene(&self, name: &str) -> Result<()> {
        self.dispatch(RemoteCommand::SetScene(name.to_string()))
            .await
            .map(drop)
    }

    pub async fn try_get_scenes(&self) -> Result<Vec<Scene>> {
        match self.dispatch(RemoteCommand::ListScenes).await? {
            CommandReply::Scenes(list) => Ok(list.scenes),
            CommandReply::Ack => Ok(Vec::new()),
        }
    }

    /// Issue the primary call, then the alternate one if the software is
    /// Streamlabs and refused the primary.
    async fn dispatch(&self, command: RemoteCommand) -> Result<CommandReply> {
        let (handle, variant) = {
            let session = self.shared.session.lock();
            match &session.handle {
                Some(handle) => (handle.clone(), session.variant),
                None => return Err(ClientError::NotConnected),
            }
        };
        let connection = self.bounded(handle.as_ref());

        let primary = command.primary();
        debug!("{}: {}", command.describe(), primary.request_type);

        let data = match connection
            .call(primary.request_type, primary.request_data)
            .await
        {
            Ok(data) => data,
            Err(e) => {
                let alternate = match command.alternate() {
                    Some(alternate) if variant.accepts_alternate_calls() && e.is_rejection() => {
                        alternate
                    }
                    _ => return Err(e.into()),
                };
                info!(
                    "{} refused by {} ({}), retrying as {}",
                    primary.request_type, variant, e, alternate.request_type
                );
                connection
                    .call(alternate.request_type, alternate.request_data)
                    .await?
            }
        };

        Ok(command.parse_reply(data)?)
    }

    fn bounded<'a>(&self, connection: &'a dyn RpcConnection) -> Bounded<'a> {
        Bounded {
            inner: connection,
            limit: self.config.request_timeout,
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Variant of the connected software; `Unknown` when disconnected
    pub fn software_type(&self) -> SoftwareVariant {
        self.shared.session.lock().variant
    }

    pub fn state(&self) -> SessionState {
        self.shared.publisher.current()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.session.lock().handle.is_some()
    }

    /// Address of the live session, after any fallback
    pub fn active_address(&self) -> Option<String> {
        self.shared.session.lock().address.clone()
    }

    /// Register an observer of the published state
    pub fn subscribe(&self) -> StateSubscriber {
        self.shared.publisher.subscribe()
    }
}

fn report(action: &str, outcome: Result<()>) -> bool {
    match outcome {
        Ok(()) => true,
        Err(e) => {
            warn!("Could not {}: {}", action, e);
            false
        }
    }
}
