//! Dashboard aggregate state
//!
//! Platform connection flags, viewer counts and the merged chat feed that the
//! UI shows next to the control session. Nothing here is persisted.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

use crate::time::{self, Timestamp};

/// Chat messages kept, newest first
pub const CHAT_HISTORY_LIMIT: usize = 100;

/// Streaming platforms shown on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformId {
    Twitch,
    #[serde(rename = "youtube")]
    YouTube,
    X,
    #[serde(rename = "linkedin")]
    LinkedIn,
}

impl PlatformId {
    pub const ALL: [PlatformId; 4] = [
        PlatformId::Twitch,
        PlatformId::YouTube,
        PlatformId::X,
        PlatformId::LinkedIn,
    ];

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            PlatformId::Twitch => "Twitch",
            PlatformId::YouTube => "YouTube",
            PlatformId::X => "X",
            PlatformId::LinkedIn => "LinkedIn",
        }
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A platform card
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub id: PlatformId,
    pub is_connected: bool,
    pub is_live: bool,
    pub viewer_count: Option<u64>,
    pub live_since: Option<Timestamp>,
}

impl Platform {
    fn new(id: PlatformId) -> Self {
        Self {
            id,
            is_connected: false,
            is_live: false,
            viewer_count: None,
            live_since: None,
        }
    }
}

/// A chat line from any platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub platform: PlatformId,
    pub username: String,
    pub message: String,
    pub timestamp: Timestamp,
}

/// Per-platform summary for connected platforms
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlatformStats {
    pub platform: PlatformId,
    pub viewer_count: u64,
    pub chat_count: usize,
    /// Seconds since the platform went live, if it is live
    pub uptime_secs: Option<u64>,
}

/// Platforms and chat feed
#[derive(Debug, Clone)]
pub struct DashboardStore {
    platforms: Vec<Platform>,
    chat: VecDeque<ChatMessage>,
}

impl Default for DashboardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardStore {
    /// All four platforms, disconnected, empty chat
    pub fn new() -> Self {
        Self {
            platforms: PlatformId::ALL.iter().copied().map(Platform::new).collect(),
            chat: VecDeque::with_capacity(CHAT_HISTORY_LIMIT),
        }
    }

    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    pub fn platform(&self, id: PlatformId) -> Option<&Platform> {
        self.platforms.iter().find(|p| p.id == id)
    }

    fn platform_mut(&mut self, id: PlatformId) -> Option<&mut Platform> {
        self.platforms.iter_mut().find(|p| p.id == id)
    }

    /// Flip the connected flag; returns the new value
    pub fn toggle_platform(&mut self, id: PlatformId) -> bool {
        match self.platform_mut(id) {
            Some(platform) => {
                platform.is_connected = !platform.is_connected;
                platform.is_connected
            }
            None => false,
        }
    }

    pub fn update_viewer_count(&mut self, id: PlatformId, count: u64) {
        if let Some(platform) = self.platform_mut(id) {
            platform.viewer_count = Some(count);
        }
    }

    /// Mark a platform live or offline, starting or clearing its uptime clock
    pub fn set_live(&mut self, id: PlatformId, live: bool) {
        if let Some(platform) = self.platform_mut(id) {
            if live && !platform.is_live {
                platform.live_since = Some(time::now());
            } else if !live {
                platform.live_since = None;
            }
            platform.is_live = live;
        }
    }

    /// Prepend a message, dropping the oldest past [`CHAT_HISTORY_LIMIT`]
    pub fn add_chat_message(&mut self, message: ChatMessage) {
        self.chat.push_front(message);
        self.chat.truncate(CHAT_HISTORY_LIMIT);
    }

    /// Newest first
    pub fn chat_messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.chat.iter()
    }

    pub fn connected_platforms(&self) -> impl Iterator<Item = &Platform> {
        self.platforms.iter().filter(|p| p.is_connected)
    }

    pub fn stats(&self) -> Vec<PlatformStats> {
        self.stats_at(time::now())
    }

    fn stats_at(&self, now: Timestamp) -> Vec<PlatformStats> {
        self.connected_platforms()
            .map(|p| PlatformStats {
                platform: p.id,
                viewer_count: p.viewer_count.unwrap_or(0),
                chat_count: self.chat.iter().filter(|m| m.platform == p.id).count(),
                uptime_secs: p.live_since.map(|since| time::elapsed_secs(since, now)),
            })
            .collect()
    }

    /// Viewers summed across connected platforms
    pub fn total_viewers(&self) -> u64 {
        self.connected_platforms()
            .map(|p| p.viewer_count.unwrap_or(0))
            .sum()
    }
}
