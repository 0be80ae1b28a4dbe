//! Gateway frame format
//!
//! Every frame exchanged over the gateway connection has the shape
//! `{ "op", "d", "s", "t" }`.

use super::{IdentifyPayload, OpCode, PresenceUpdatePayload, RequestGuildMembersPayload, ResumePayload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Gateway frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayMessage {
    /// Operation code
    pub op: OpCode,

    /// Event name (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    /// Sequence number (only for op=0 Dispatch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Frame payload
    #[serde(default)]
    pub d: Option<Value>,
}

impl GatewayMessage {
    fn new(op: OpCode, d: Option<Value>) -> Self {
        Self { op, t: None, s: None, d }
    }

    fn with_payload<T: Serialize>(op: OpCode, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(op, Some(serde_json::to_value(payload)?)))
    }

    // === Client Frames ===

    /// Create a Heartbeat frame (op=1) carrying the last seen sequence
    #[must_use]
    pub fn heartbeat(last_sequence: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, Some(last_sequence.map_or(Value::Null, Value::from)))
    }

    /// Create an Identify frame (op=2)
    pub fn identify(payload: &IdentifyPayload) -> Result<Self, serde_json::Error> {
        Self::with_payload(OpCode::Identify, payload)
    }

    /// Create a Presence Update frame (op=3)
    pub fn presence_update(payload: &PresenceUpdatePayload) -> Result<Self, serde_json::Error> {
        Self::with_payload(OpCode::PresenceUpdate, payload)
    }

    /// Create a Resume frame (op=6)
    pub fn resume(payload: &ResumePayload) -> Result<Self, serde_json::Error> {
        Self::with_payload(OpCode::Resume, payload)
    }

    /// Create a Request Guild Members frame (op=8)
    pub fn request_guild_members(payload: &RequestGuildMembersPayload) -> Result<Self, serde_json::Error> {
        Self::with_payload(OpCode::RequestGuildMembers, payload)
    }

    // === Server Frames ===

    /// Create a Dispatch frame (op=0)
    #[must_use]
    pub fn dispatch(event_name: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            t: Some(event_name.into()),
            s: Some(sequence),
            d: Some(data),
        }
    }

    /// Create a Hello frame (op=10)
    #[must_use]
    pub fn hello(heartbeat_interval: u64) -> Self {
        Self::new(
            OpCode::Hello,
            Some(serde_json::json!({ "heartbeat_interval": heartbeat_interval })),
        )
    }

    /// Create a Heartbeat ACK frame (op=11)
    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self::new(OpCode::HeartbeatAck, None)
    }

    /// Create a Reconnect frame (op=7)
    #[must_use]
    pub fn reconnect() -> Self {
        Self::new(OpCode::Reconnect, None)
    }

    /// Create an Invalid Session frame (op=9)
    #[must_use]
    pub fn invalid_session(resumable: bool) -> Self {
        Self::new(OpCode::InvalidSession, Some(Value::Bool(resumable)))
    }

    // === Parsing Server Frames ===

    /// Heartbeat interval of a Hello frame
    #[must_use]
    pub fn as_hello_interval(&self) -> Option<u64> {
        if self.op != OpCode::Hello {
            return None;
        }
        self.d.as_ref()?.get("heartbeat_interval")?.as_u64()
    }

    /// Resumable flag of an Invalid Session frame
    #[must_use]
    pub fn as_invalid_session(&self) -> Option<bool> {
        if self.op != OpCode::InvalidSession {
            return None;
        }
        Some(self.d.as_ref().and_then(Value::as_bool).unwrap_or(false))
    }

    /// Event name, sequence and data of a Dispatch frame
    #[must_use]
    pub fn as_dispatch(&self) -> Option<(&str, u64, &Value)> {
        if self.op != OpCode::Dispatch {
            return None;
        }
        static NULL: Value = Value::Null;
        Some((self.t.as_deref()?, self.s?, self.d.as_ref().unwrap_or(&NULL)))
    }

    // === Utilities ===

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl std::fmt::Display for GatewayMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(t) = &self.t {
            write!(f, "GatewayMessage(op={}, t={}", self.op, t)?;
            if let Some(s) = self.s {
                write!(f, ", s={s}")?;
            }
            write!(f, ")")
        } else {
            write!(f, "GatewayMessage(op={})", self.op)
        }
    }
}
