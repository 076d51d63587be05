//! obs-websocket 5.x envelope
//!
//! Every frame is a JSON text message `{ "op": <u8>, "d": { ... } }`. Both
//! directions are modeled so the same types back the client transport and
//! the test server.

use base64::Engine;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Op codes
pub mod op {
    pub const HELLO: u8 = 0;
    pub const IDENTIFY: u8 = 1;
    pub const IDENTIFIED: u8 = 2;
    pub const REIDENTIFY: u8 = 3;
    pub const EVENT: u8 = 5;
    pub const REQUEST: u8 = 6;
    pub const REQUEST_RESPONSE: u8 = 7;
    pub const REQUEST_BATCH: u8 = 8;
    pub const REQUEST_BATCH_RESPONSE: u8 = 9;
}

/// RPC version negotiated in `Identify`
pub const RPC_VERSION: u32 = 1;

/// `requestStatus.code` values the client cares about
pub mod status {
    pub const SUCCESS: u32 = 100;
    pub const MISSING_REQUEST_TYPE: u32 = 203;
    pub const UNKNOWN_REQUEST_TYPE: u32 = 204;
    pub const GENERIC_ERROR: u32 = 205;
    pub const MISSING_REQUEST_FIELD: u32 = 300;
    pub const OUTPUT_RUNNING: u32 = 500;
    pub const OUTPUT_NOT_RUNNING: u32 = 501;
    pub const RESOURCE_NOT_FOUND: u32 = 600;
}

/// WebSocket close codes sent by the server
pub mod close_code {
    pub const UNKNOWN_REASON: u16 = 4000;
    pub const MESSAGE_DECODE_ERROR: u16 = 4002;
    pub const NOT_IDENTIFIED: u16 = 4007;
    pub const AUTHENTICATION_FAILED: u16 = 4009;
    pub const UNSUPPORTED_RPC_VERSION: u16 = 4010;
    pub const SESSION_INVALIDATED: u16 = 4011;
}

/// Event type names
pub mod event {
    pub const STREAM_STATE_CHANGED: &str = "StreamStateChanged";
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    op: u8,
    d: Value,
}

/// Server greeting (op 0)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hello {
    pub obs_web_socket_version: String,
    pub rpc_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AuthChallenge>,
}

/// Authentication challenge carried in [`Hello`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChallenge {
    pub challenge: String,
    pub salt: String,
}

/// Client identification (op 1)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identify {
    pub rpc_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_subscriptions: Option<u32>,
}

/// Identification accepted (op 2)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identified {
    pub negotiated_rpc_version: u32,
}

/// Push event (op 5)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub event_type: String,
    #[serde(default)]
    pub event_intent: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_data: Option<Value>,
}

/// Request (op 6)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub request_type: String,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
}

/// Outcome block of a [`RequestResponse`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestStatus {
    pub result: bool,
    pub code: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl RequestStatus {
    pub fn ok() -> Self {
        Self {
            result: true,
            code: status::SUCCESS,
            comment: None,
        }
    }

    pub fn failed(code: u32, comment: &str) -> Self {
        Self {
            result: false,
            code,
            comment: Some(comment.to_string()),
        }
    }
}

/// Response to a request (op 7)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub request_type: String,
    pub request_id: String,
    pub request_status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
}

impl RequestResponse {
    /// Response data on success (`null` when the request returns nothing), status otherwise
    pub fn into_result(self) -> std::result::Result<Value, RequestStatus> {
        if self.request_status.result {
            Ok(self.response_data.unwrap_or(Value::Null))
        } else {
            Err(self.request_status)
        }
    }
}

/// Messages a server sends
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Hello(Hello),
    Identified(Identified),
    Event(Event),
    RequestResponse(RequestResponse),
}

impl ServerMessage {
    pub fn encode(&self) -> Result<String> {
        match self {
            ServerMessage::Hello(d) => encode_envelope(op::HELLO, d),
            ServerMessage::Identified(d) => encode_envelope(op::IDENTIFIED, d),
            ServerMessage::Event(d) => encode_envelope(op::EVENT, d),
            ServerMessage::RequestResponse(d) => encode_envelope(op::REQUEST_RESPONSE, d),
        }
    }

    pub fn decode(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;
        match envelope.op {
            op::HELLO => Ok(ServerMessage::Hello(payload(envelope.d)?)),
            op::IDENTIFIED => Ok(ServerMessage::Identified(payload(envelope.d)?)),
            op::EVENT => Ok(ServerMessage::Event(payload(envelope.d)?)),
            op::REQUEST_RESPONSE => Ok(ServerMessage::RequestResponse(payload(envelope.d)?)),
            op::IDENTIFY | op::REIDENTIFY | op::REQUEST | op::REQUEST_BATCH => {
                Err(Error::UnexpectedOpCode {
                    op: envelope.op,
                    side: "server",
                })
            }
            other => Err(Error::UnknownOpCode(other)),
        }
    }
}

/// Messages a client sends
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Identify(Identify),
    Request(Request),
}

impl ClientMessage {
    pub fn encode(&self) -> Result<String> {
        match self {
            ClientMessage::Identify(d) => encode_envelope(op::IDENTIFY, d),
            ClientMessage::Request(d) => encode_envelope(op::REQUEST, d),
        }
    }

    pub fn decode(text: &str) -> Result<Self> {
        let envelope: Envelope = serde_json::from_str(text)?;
        match envelope.op {
            op::IDENTIFY => Ok(ClientMessage::Identify(payload(envelope.d)?)),
            op::REQUEST => Ok(ClientMessage::Request(payload(envelope.d)?)),
            op::HELLO
            | op::IDENTIFIED
            | op::REIDENTIFY
            | op::EVENT
            | op::REQUEST_RESPONSE
            | op::REQUEST_BATCH
            | op::REQUEST_BATCH_RESPONSE => Err(Error::UnexpectedOpCode {
                op: envelope.op,
                side: "client",
            }),
            other => Err(Error::UnknownOpCode(other)),
        }
    }
}

fn encode_envelope<T: Serialize>(op: u8, d: &T) -> Result<String> {
    let envelope = Envelope {
        op,
        d: serde_json::to_value(d).map_err(|e| Error::EncodeError(e.to_string()))?,
    };
    serde_json::to_string(&envelope).map_err(|e| Error::EncodeError(e.to_string()))
}

fn payload<T: DeserializeOwned>(d: Value) -> Result<T> {
    serde_json::from_value(d).map_err(|e| Error::DecodeError(e.to_string()))
}

/// Authentication string for `Identify`:
/// `base64(sha256(base64(sha256(password + salt)) + challenge))`
pub fn auth_response(password: &str, salt: &str, challenge: &str) -> String {
    let engine = base64::engine::general_purpose::STANDARD;
    let secret = engine.encode(Sha256::digest(format!("{}{}", password, salt).as_bytes()));
    engine.encode(Sha256::digest(format!("{}{}", secret, challenge).as_bytes()))
}
