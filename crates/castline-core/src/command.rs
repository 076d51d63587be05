//! Logical commands and their wire-level request names
//!
//! Every [`RemoteCommand`] has a primary obs-websocket 5.x request. Streamlabs
//! Desktop still accepts some pre-5.x names, so commands that were renamed in
//! 5.x also carry an alternate request tried once when the primary is rejected.

use serde_json::{json, Value};

use crate::reply::{CommandReply, SceneListReply};
use crate::Result;

/// Request type names
pub mod request {
    pub const GET_VERSION: &str = "GetVersion";
    pub const GET_STREAM_STATUS: &str = "GetStreamStatus";
    pub const START_STREAM: &str = "StartStream";
    pub const STOP_STREAM: &str = "StopStream";
    pub const SET_CURRENT_PROGRAM_SCENE: &str = "SetCurrentProgramScene";
    pub const GET_SCENE_LIST: &str = "GetSceneList";

    // Pre-5.x names
    pub const START_STREAMING: &str = "StartStreaming";
    pub const STOP_STREAMING: &str = "StopStreaming";
    pub const SET_CURRENT_SCENE: &str = "SetCurrentScene";
}

/// A single request as it goes on the wire
#[derive(Debug, Clone, PartialEq)]
pub struct WireCall {
    pub request_type: &'static str,
    pub request_data: Option<Value>,
}

impl WireCall {
    fn bare(request_type: &'static str) -> Self {
        Self {
            request_type,
            request_data: None,
        }
    }

    fn with_data(request_type: &'static str, data: Value) -> Self {
        Self {
            request_type,
            request_data: Some(data),
        }
    }
}

/// A logical operation on the remote software
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCommand {
    StartStream,
    StopStream,
    SetScene(String),
    ListScenes,
}

impl RemoteCommand {
    /// Human-readable name used in logs
    pub fn describe(&self) -> &'static str {
        match self {
            RemoteCommand::StartStream => "start streaming",
            RemoteCommand::StopStream => "stop streaming",
            RemoteCommand::SetScene(_) => "switch scene",
            RemoteCommand::ListScenes => "list scenes",
        }
    }

    /// The obs-websocket 5.x request
    pub fn primary(&self) -> WireCall {
        match self {
            RemoteCommand::StartStream => WireCall::bare(request::START_STREAM),
            RemoteCommand::StopStream => WireCall::bare(request::STOP_STREAM),
            RemoteCommand::SetScene(name) => WireCall::with_data(
                request::SET_CURRENT_PROGRAM_SCENE,
                json!({ "sceneName": name }),
            ),
            RemoteCommand::ListScenes => WireCall::bare(request::GET_SCENE_LIST),
        }
    }

    /// The pre-5.x request, if the name or parameter shape differs from the primary.
    ///
    /// `GetSceneList` kept its name across versions, so listing has none.
    pub fn alternate(&self) -> Option<WireCall> {
        match self {
            RemoteCommand::StartStream => Some(WireCall::bare(request::START_STREAMING)),
            RemoteCommand::StopStream => Some(WireCall::bare(request::STOP_STREAMING)),
            RemoteCommand::SetScene(name) => Some(WireCall::with_data(
                request::SET_CURRENT_SCENE,
                json!({ "scene-name": name }),
            )),
            RemoteCommand::ListScenes => None,
        }
    }

    /// Validate a successful reply against what this command promises
    pub fn parse_reply(&self, data: Value) -> Result<CommandReply> {
        match self {
            RemoteCommand::StartStream | RemoteCommand::StopStream | RemoteCommand::SetScene(_) => {
                Ok(CommandReply::Ack)
            }
            RemoteCommand::ListScenes => SceneListReply::from_value(data).map(CommandReply::Scenes),
        }
    }
}
