//! In-process obs-websocket 5.x server
//!
//! Speaks the real wire protocol over a real socket so the WebSocket
//! transport and the session manager can be driven end to end. Shuts down
//! when dropped.

use castline_core::protocol::{
    self, auth_response, close_code, event, status, AuthChallenge, ClientMessage, Event, Hello,
    Identified, Request, RequestResponse, RequestStatus, ServerMessage,
};
use castline_core::request;
use futures::{Sink, SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

const CHALLENGE: &str = "+IxH4CnCiqpX1rM9scsNynZzbOe4KhDeYcTNS3PDaeY=";
const SALT: &str = "lM1GncleQOaCu9lT1yeUZhFYnqhsLLP1G5lAGo3ixaI=";

/// Event intent bit for output events
const OUTPUTS_INTENT: u32 = 1 << 6;

/// How the test server presents itself
#[derive(Debug, Clone)]
pub struct ObsServerConfig {
    /// Require authentication with this password
    pub password: Option<String>,
    /// Reported by `GetVersion`
    pub vendor_name: String,
    /// Scene names, in index order; the first is live initially
    pub scenes: Vec<String>,
    /// Push `StreamStateChanged` after start/stop succeeds
    pub emit_stream_events: bool,
    /// Reject the 5.x command names and accept the 4.x ones instead
    pub legacy_names: bool,
    /// Events pushed right after `Identified`, before any request is read
    pub greeting_events: usize,
}

impl Default for ObsServerConfig {
    fn default() -> Self {
        Self {
            password: None,
            vendor_name: "OBS Studio".to_string(),
            scenes: vec![
                "Main".to_string(),
                "Intro".to_string(),
                "Be Right Back".to_string(),
            ],
            emit_stream_events: true,
            legacy_names: false,
            greeting_events: 0,
        }
    }
}

impl ObsServerConfig {
    /// A Streamlabs Desktop that only understands the older command names
    pub fn streamlabs() -> Self {
        Self {
            vendor_name: "Streamlabs Desktop".to_string(),
            legacy_names: true,
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: &str) -> Self {
        self.password = Some(password.to_string());
        self
    }

    pub fn with_greeting_events(mut self, count: usize) -> Self {
        self.greeting_events = count;
        self
    }
}

/// Overridden answer for a request type
#[derive(Debug, Clone)]
pub enum ServerResponse {
    Ok(Value),
    Reject { code: u32, comment: String },
    /// Never answers
    Hang,
}

#[derive(Debug, Clone)]
enum Push {
    Frame(String),
    Disconnect,
}

struct ServerState {
    streaming: bool,
    current_scene: Option<String>,
}

struct Shared {
    config: ObsServerConfig,
    state: Mutex<ServerState>,
    overrides: Mutex<HashMap<String, ServerResponse>>,
    requests: Mutex<Vec<Request>>,
    clients: AtomicUsize,
    push: broadcast::Sender<Push>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Test obs-websocket server with automatic cleanup
pub struct MockObsServer {
    port: u16,
    shared: Arc<Shared>,
    handle: JoinHandle<()>,
}

impl MockObsServer {
    /// Start a plain OBS Studio server with no password
    pub async fn start() -> Self {
        Self::start_with(ObsServerConfig::default()).await
    }

    pub async fn start_with(config: ObsServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let (push, _) = broadcast::channel(64);
        let shared = Arc::new(Shared {
            state: Mutex::new(ServerState {
                streaming: false,
                current_scene: config.scenes.first().cloned(),
            }),
            config,
            overrides: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            clients: AtomicUsize::new(0),
            push,
            tasks: Mutex::new(Vec::new()),
        });

        let accept_shared = shared.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                debug!("Test server accepted {}", peer);
                let client = tokio::spawn(serve_client(stream, accept_shared.clone()));
                accept_shared.tasks.lock().push(client);
            }
        });

        Self {
            port,
            shared,
            handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}", self.port)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Override the answer for a request type
    pub fn set_response(&self, request_type: &str, response: ServerResponse) {
        self.shared
            .overrides
            .lock()
            .insert(request_type.to_string(), response);
    }

    /// Every request received, in order
    pub fn requests(&self) -> Vec<Request> {
        self.shared.requests.lock().clone()
    }

    pub fn request_types(&self) -> Vec<String> {
        self.shared
            .requests
            .lock()
            .iter()
            .map(|r| r.request_type.clone())
            .collect()
    }

    /// Wait until at least `count` requests have arrived
    pub async fn wait_for_requests(&self, count: usize, max_wait: Duration) -> bool {
        crate::wait_until(|| self.shared.requests.lock().len() >= count, max_wait).await
    }

    pub fn is_streaming(&self) -> bool {
        self.shared.state.lock().streaming
    }

    pub fn current_scene(&self) -> Option<String> {
        self.shared.state.lock().current_scene.clone()
    }

    /// Identified clients currently attached
    pub fn client_count(&self) -> usize {
        self.shared.clients.load(Ordering::SeqCst)
    }

    /// Push a `StreamStateChanged` event to every client
    pub fn emit_stream_state(&self, active: bool) {
        self.shared.state.lock().streaming = active;
        broadcast_frame(&self.shared, stream_state_event(active));
    }

    /// Push an arbitrary event to every client
    pub fn emit_event(&self, event_type: &str, data: Option<Value>) {
        broadcast_frame(
            &self.shared,
            Event {
                event_type: event_type.to_string(),
                event_intent: 0,
                event_data: data,
            },
        );
    }

    /// Close every client socket from the server side
    pub fn disconnect_clients(&self) {
        let _ = self.shared.push.send(Push::Disconnect);
    }
}

impl Drop for MockObsServer {
    fn drop(&mut self) {
        self.handle.abort();
        for task in self.shared.tasks.lock().drain(..) {
            task.abort();
        }
    }
}

fn stream_state_event(active: bool) -> Event {
    let output_state = if active {
        "OBS_WEBSOCKET_OUTPUT_STARTED"
    } else {
        "OBS_WEBSOCKET_OUTPUT_STOPPED"
    };
    Event {
        event_type: event::STREAM_STATE_CHANGED.to_string(),
        event_intent: OUTPUTS_INTENT,
        event_data: Some(json!({ "outputActive": active, "outputState": output_state })),
    }
}

fn broadcast_frame(shared: &Shared, ev: Event) {
    if let Ok(text) = ServerMessage::Event(ev).encode() {
        let _ = shared.push.send(Push::Frame(text));
    }
}

async fn serve_client(stream: TcpStream, shared: Arc<Shared>) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            debug!("Test server handshake failed: {}", e);
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    let hello = ServerMessage::Hello(Hello {
        obs_web_socket_version: "5.4.2".to_string(),
        rpc_version: protocol::RPC_VERSION,
        authentication: shared.config.password.as_ref().map(|_| AuthChallenge {
            challenge: CHALLENGE.to_string(),
            salt: SALT.to_string(),
        }),
    });
    if send(&mut write, &hello).await.is_err() {
        return;
    }

    let identify = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => match ClientMessage::decode(&text) {
                Ok(ClientMessage::Identify(identify)) => break identify,
                _ => {
                    let _ = write
                        .send(close(close_code::NOT_IDENTIFIED, "Not identified."))
                        .await;
                    return;
                }
            },
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            Some(Ok(_)) => continue,
        }
    };

    if let Some(password) = &shared.config.password {
        let expected = auth_response(password, SALT, CHALLENGE);
        if identify.authentication.as_deref() != Some(expected.as_str()) {
            let _ = write
                .send(close(
                    close_code::AUTHENTICATION_FAILED,
                    "Authentication failed.",
                ))
                .await;
            return;
        }
    }

    let identified = ServerMessage::Identified(Identified {
        negotiated_rpc_version: protocol::RPC_VERSION,
    });
    if send(&mut write, &identified).await.is_err() {
        return;
    }

    for index in 0..shared.config.greeting_events {
        let chatter = ServerMessage::Event(Event {
            event_type: "InputSettingsChanged".to_string(),
            event_intent: 1 << 3,
            event_data: Some(json!({ "inputName": "Mic/Aux", "sequence": index })),
        });
        if send(&mut write, &chatter).await.is_err() {
            return;
        }
    }

    let mut push = shared.push.subscribe();
    shared.clients.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let req = match ClientMessage::decode(&text) {
                        Ok(ClientMessage::Request(req)) => req,
                        _ => continue,
                    };
                    shared.requests.lock().push(req.clone());
                    let Some((response, follow_up)) = handle_request(&shared, &req) else {
                        continue;
                    };
                    if send(&mut write, &response).await.is_err() {
                        break;
                    }
                    if let Some(ev) = follow_up {
                        broadcast_frame(&shared, ev);
                    }
                }
                Some(Ok(Message::Close(_))) => {
                    let _ = write.close().await;
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
            pushed = push.recv() => match pushed {
                Ok(Push::Frame(text)) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Push::Disconnect) => {
                    let _ = write.send(close(1001, "Server stopping")).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    shared.clients.fetch_sub(1, Ordering::SeqCst);
}

async fn send<W>(write: &mut W, msg: &ServerMessage) -> Result<(), ()>
where
    W: Sink<Message> + Unpin,
{
    let text = msg.encode().map_err(|_| ())?;
    write.send(Message::Text(text)).await.map_err(|_| ())
}

fn close(code: u16, reason: &str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::from(code),
        reason: reason.to_string().into(),
    }))
}

/// Builds the reply to a request, plus an event to push after it.
/// `None` means the request is left unanswered.
fn handle_request(shared: &Shared, req: &Request) -> Option<(ServerMessage, Option<Event>)> {
    let override_response = shared.overrides.lock().get(&req.request_type).cloned();
    let (status, data, follow_up) = match override_response {
        Some(ServerResponse::Hang) => return None,
        Some(ServerResponse::Ok(value)) => (RequestStatus::ok(), Some(value), None),
        Some(ServerResponse::Reject { code, comment }) => {
            (RequestStatus::failed(code, &comment), None, None)
        }
        None => default_response(shared, req),
    };

    let response = ServerMessage::RequestResponse(RequestResponse {
        request_type: req.request_type.clone(),
        request_id: req.request_id.clone(),
        request_status: status,
        response_data: data,
    });
    Some((response, follow_up))
}

fn default_response(shared: &Shared, req: &Request) -> (RequestStatus, Option<Value>, Option<Event>) {
    let config = &shared.config;
    let legacy = config.legacy_names;
    let field = |name: &str| {
        req.request_data
            .as_ref()
            .and_then(|d| d.get(name))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    match req.request_type.as_str() {
        request::GET_VERSION => (
            RequestStatus::ok(),
            Some(json!({
                "vendorName": config.vendor_name,
                "obsVersion": "30.1.2",
                "obsWebSocketVersion": "5.4.2",
                "rpcVersion": protocol::RPC_VERSION,
                "platformDescription": "Test Platform"
            })),
            None,
        ),
        request::GET_STREAM_STATUS => {
            let streaming = shared.state.lock().streaming;
            (
                RequestStatus::ok(),
                Some(json!({ "outputActive": streaming })),
                None,
            )
        }
        request::START_STREAM if !legacy => set_streaming(shared, true),
        request::START_STREAMING if legacy => set_streaming(shared, true),
        request::STOP_STREAM if !legacy => set_streaming(shared, false),
        request::STOP_STREAMING if legacy => set_streaming(shared, false),
        request::SET_CURRENT_PROGRAM_SCENE if !legacy => set_scene(shared, field("sceneName")),
        request::SET_CURRENT_SCENE if legacy => set_scene(shared, field("scene-name")),
        request::GET_SCENE_LIST => {
            let current = shared.state.lock().current_scene.clone();
            let scenes: Vec<Value> = config
                .scenes
                .iter()
                .enumerate()
                .map(|(i, name)| json!({ "sceneName": name, "sceneIndex": i }))
                .collect();
            (
                RequestStatus::ok(),
                Some(json!({
                    "currentProgramSceneName": current,
                    "currentPreviewSceneName": null,
                    "scenes": scenes
                })),
                None,
            )
        }
        other => (
            RequestStatus::failed(
                status::UNKNOWN_REQUEST_TYPE,
                &format!("Your request type is not valid: {}", other),
            ),
            None,
            None,
        ),
    }
}

fn set_streaming(shared: &Shared, active: bool) -> (RequestStatus, Option<Value>, Option<Event>) {
    let mut state = shared.state.lock();
    if state.streaming == active {
        let (code, comment) = if active {
            (status::OUTPUT_RUNNING, "The stream output is already running.")
        } else {
            (status::OUTPUT_NOT_RUNNING, "The stream output is not running.")
        };
        return (RequestStatus::failed(code, comment), None, None);
    }
    state.streaming = active;

    let follow_up = shared
        .config
        .emit_stream_events
        .then(|| stream_state_event(active));
    (RequestStatus::ok(), None, follow_up)
}

fn set_scene(shared: &Shared, name: Option<String>) -> (RequestStatus, Option<Value>, Option<Event>) {
    let Some(name) = name else {
        return (
            RequestStatus::failed(status::MISSING_REQUEST_FIELD, "Missing field sceneName"),
            None,
            None,
        );
    };
    if !shared.config.scenes.contains(&name) {
        return (
            RequestStatus::failed(
                status::RESOURCE_NOT_FOUND,
                &format!("No source was found by the name of `{}`.", name),
            ),
            None,
            None,
        );
    }
    shared.state.lock().current_scene = Some(name);
    (RequestStatus::ok(), None, None)
}
