//! Typed replies
//!
//! Reply payloads are validated here, at the boundary, rather than trusted
//! structurally by callers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::request;
use crate::{Error, Result};

/// Reply to `GetVersion`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionReply {
    #[serde(default)]
    pub vendor_name: Option<String>,
    #[serde(default)]
    pub obs_version: Option<String>,
    #[serde(default)]
    pub obs_web_socket_version: Option<String>,
    #[serde(default)]
    pub rpc_version: Option<u32>,
    #[serde(default)]
    pub platform_description: Option<String>,
}

impl VersionReply {
    pub fn from_value(data: Value) -> Result<Self> {
        if !data.is_object() {
            return Err(Error::invalid_reply(request::GET_VERSION, "expected an object"));
        }
        serde_json::from_value(data).map_err(|e| Error::invalid_reply(request::GET_VERSION, e))
    }

    /// Vendor identifier, empty when the software does not report one
    pub fn vendor(&self) -> &str {
        self.vendor_name.as_deref().unwrap_or("")
    }
}

/// A scene as reported by `GetSceneList`
///
/// 5.x reports `sceneName`/`sceneIndex`; the pre-5.x shape uses `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    #[serde(alias = "name")]
    pub scene_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene_uuid: Option<String>,
}

/// Reply to `GetSceneList`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneListReply {
    #[serde(default, alias = "current-scene")]
    pub current_program_scene_name: Option<String>,
    pub scenes: Vec<Scene>,
}

impl SceneListReply {
    pub fn from_value(data: Value) -> Result<Self> {
        serde_json::from_value(data).map_err(|e| Error::invalid_reply(request::GET_SCENE_LIST, e))
    }
}

/// Validated result of a [`RemoteCommand`](crate::RemoteCommand)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    /// Accepted; the command has no meaningful payload
    Ack,
    Scenes(SceneListReply),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_version_reply_with_vendor() {
        let reply = VersionReply::from_value(json!({
            "vendorName": "Streamlabs Desktop",
            "obsVersion": "30.0.0",
            "rpcVersion": 1
        }))
        .unwrap();
        assert_eq!(reply.vendor(), "Streamlabs Desktop");
        assert_eq!(reply.rpc_version, Some(1));
    }

    #[test]
    fn test_version_reply_without_vendor_is_empty() {
        let reply = VersionReply::from_value(json!({
            "obsVersion": "30.1.2",
            "obsWebSocketVersion": "5.4.2",
            "availableRequests": ["GetVersion"]
        }))
        .unwrap();
        assert_eq!(reply.vendor(), "");
        assert_eq!(reply.obs_web_socket_version.as_deref(), Some("5.4.2"));
    }

    #[test]
    fn test_version_reply_rejects_non_object() {
        assert!(VersionReply::from_value(Value::Null).is_err());
        assert!(VersionReply::from_value(json!("OBS")).is_err());
    }

    #[test]
    fn test_version_reply_rejects_wrong_vendor_type() {
        assert!(VersionReply::from_value(json!({ "vendorName": 42 })).is_err());
    }

    #[test]
    fn test_scene_list_v5_shape() {
        let reply = SceneListReply::from_value(json!({
            "currentProgramSceneName": "Main",
            "currentPreviewSceneName": null,
            "scenes": [
                { "sceneName": "Intro", "sceneIndex": 1, "sceneUuid": "a" },
                { "sceneName": "Main", "sceneIndex": 0, "sceneUuid": "b" }
            ]
        }))
        .unwrap();
        assert_eq!(reply.current_program_scene_name.as_deref(), Some("Main"));
        assert_eq!(reply.scenes.len(), 2);
        assert_eq!(reply.scenes[0].scene_name, "Intro");
        assert_eq!(reply.scenes[0].scene_index, Some(1));
    }

    #[test]
    fn test_scene_list_legacy_shape() {
        let reply = SceneListReply::from_value(json!({
            "current-scene": "BRB",
            "scenes": [ { "name": "BRB", "sources": [] } ]
        }))
        .unwrap();
        assert_eq!(reply.current_program_scene_name.as_deref(), Some("BRB"));
        assert_eq!(reply.scenes[0].scene_name, "BRB");
        assert_eq!(reply.scenes[0].scene_index, None);
    }

    #[test]
    fn test_scene_list_requires_scenes() {
        let err = SceneListReply::from_value(json!({ "currentProgramSceneName": "x" }))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidReply { request: "GetSceneList", .. }));
    }
}
