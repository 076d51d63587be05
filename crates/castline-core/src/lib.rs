//! Castline Core
//!
//! Shared types for the castline control-plane session manager.
//!
//! This crate provides:
//! - Session domain types ([`SoftwareVariant`], [`SessionState`], [`ConnectionTarget`])
//! - Logical commands and their wire mapping ([`RemoteCommand`], [`WireCall`])
//! - Typed replies validated at the boundary ([`VersionReply`], [`SceneListReply`])
//! - The obs-websocket v5 envelope ([`protocol`])
//! - Dashboard aggregate state ([`DashboardStore`])

pub mod command;
pub mod dashboard;
pub mod error;
pub mod protocol;
pub mod reply;
pub mod time;
pub mod types;

pub use command::{request, RemoteCommand, WireCall};
pub use dashboard::{ChatMessage, DashboardStore, Platform, PlatformId, PlatformStats};
pub use error::{Error, Result};
pub use reply::{CommandReply, Scene, SceneListReply, VersionReply};
pub use time::Timestamp;
pub use types::*;

/// Default control endpoint of OBS Studio (obs-websocket 5.x)
pub const DEFAULT_PRIMARY_ADDRESS: &str = "ws://localhost:4455";

/// Default control endpoint of Streamlabs Desktop, tried when the primary default fails
pub const DEFAULT_SECONDARY_ADDRESS: &str = "ws://localhost:59650";

/// Case-insensitive vendor substring that identifies Streamlabs
pub const SECONDARY_VENDOR_MARKER: &str = "streamlabs";
