//! Gateway payload definitions
//!
//! Payloads carried in the `d` field of frames the client sends and receives.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload for op 10 (Hello)
///
/// First frame sent by the server after the connection opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloPayload {
    /// Heartbeat interval in milliseconds
    pub heartbeat_interval: u64,
}

impl HelloPayload {
    /// Default heartbeat interval (45 seconds)
    pub const DEFAULT_HEARTBEAT_INTERVAL: u64 = 45_000;

    /// Create a Hello payload with custom interval
    #[must_use]
    pub fn with_interval(heartbeat_interval: u64) -> Self {
        Self { heartbeat_interval }
    }
}

impl Default for HelloPayload {
    fn default() -> Self {
        Self::with_interval(Self::DEFAULT_HEARTBEAT_INTERVAL)
    }
}

/// Payload for op 2 (Identify)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyPayload {
    /// Authentication token
    pub token: String,

    /// Client connection properties
    pub properties: IdentifyProperties,

    /// Whether the server may compress payloads
    pub compress: bool,

    /// Member count above which offline members are not sent with a guild
    pub large_threshold: u32,

    /// `[shard_id, shard_count]`
    pub shard: [u32; 2],
}

impl IdentifyPayload {
    /// Create an identify payload for one shard
    #[must_use]
    pub fn new(token: impl Into<String>, shard_id: u32, shard_count: u32, large_threshold: u32) -> Self {
        Self {
            token: token.into(),
            properties: IdentifyProperties::default(),
            compress: false,
            large_threshold,
            shard: [shard_id, shard_count],
        }
    }
}

/// Client connection properties
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system
    #[serde(rename = "$os")]
    pub os: String,

    /// Library name
    #[serde(rename = "$browser")]
    pub browser: String,

    /// Device name
    #[serde(rename = "$device")]
    pub device: String,
}

impl IdentifyProperties {
    /// Set operating system
    #[must_use]
    pub fn with_os(mut self, os: impl Into<String>) -> Self {
        self.os = os.into();
        self
    }

    /// Set library name
    #[must_use]
    pub fn with_browser(mut self, browser: impl Into<String>) -> Self {
        self.browser = browser.into();
        self
    }

    /// Set device name
    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: env!("CARGO_PKG_NAME").to_string(),
            device: env!("CARGO_PKG_NAME").to_string(),
        }
    }
}

/// Payload for op 3 (Presence Update)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceUpdatePayload {
    /// Unix time in milliseconds since the client went idle
    pub since: Option<u64>,

    /// Activity shown under the user's name
    pub game: Option<Value>,

    /// New status (online, idle, dnd, invisible, offline)
    pub status: String,

    /// Whether the client is away from keyboard
    pub afk: bool,
}

impl PresenceUpdatePayload {
    /// Valid status values
    pub const VALID_STATUSES: &'static [&'static str] = &["online", "idle", "dnd", "invisible", "offline"];

    /// Create a presence update with only a status
    #[must_use]
    pub fn status(status: impl Into<String>) -> Self {
        Self {
            since: None,
            game: None,
            status: status.into(),
            afk: false,
        }
    }

    /// Set the displayed game by name
    #[must_use]
    pub fn with_game(mut self, name: impl Into<String>) -> Self {
        self.game = Some(serde_json::json!({ "name": name.into(), "type": 0 }));
        self
    }

    /// Check if the status is valid
    #[must_use]
    pub fn is_valid_status(&self) -> bool {
        Self::VALID_STATUSES.contains(&self.status.as_str())
    }
}

/// Payload for op 6 (Resume)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumePayload {
    /// Authentication token
    pub token: String,

    /// Session ID to resume
    pub session_id: String,

    /// Last received sequence number
    pub seq: u64,
}

/// Payload for op 8 (Request Guild Members)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestGuildMembersPayload {
    /// Guild to fetch members of
    pub guild_id: String,

    /// Username prefix filter, empty for all members
    pub query: String,

    /// Maximum number of members, 0 for no limit
    pub limit: u32,
}

impl RequestGuildMembersPayload {
    /// Request every member of a guild
    #[must_use]
    pub fn all(guild_id: impl Into<String>) -> Self {
        Self {
            guild_id: guild_id.into(),
            query: String::new(),
            limit: 0,
        }
    }
}

/// Data of the READY dispatch
#[derive(Debug, Clone, Deserialize)]
pub struct ReadyPayload {
    /// Gateway protocol version
    #[serde(rename = "v", default)]
    pub version: u8,

    /// Session identifier used for resuming
    pub session_id: String,

    /// The connected user
    #[serde(default)]
    pub user: Value,

    /// Guilds the user is in, initially unavailable
    #[serde(default)]
    pub guilds: Vec<Value>,

    /// Direct message channels
    #[serde(default)]
    pub private_channels: Vec<Value>,
}
