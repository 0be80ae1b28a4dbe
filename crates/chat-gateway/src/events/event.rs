//! Event value handed to event handlers

use super::GatewayEventType;
use chat_core::EntityRef;
use serde_json::Value;

/// One applied dispatch event
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    /// Wire name from the `t` field
    pub name: String,
    /// Parsed event type, `None` for events this library does not model
    pub kind: Option<GatewayEventType>,
    /// Sequence number of the dispatch frame
    pub sequence: u64,
    /// Shard that received the event
    pub shard: u32,
    /// Entities touched by the event, already updated in the cache
    pub affected: Vec<EntityRef>,
    /// Raw event payload
    pub data: Value,
}

impl GatewayEvent {
    #[must_use]
    pub fn is(&self, kind: GatewayEventType) -> bool {
        self.kind == Some(kind)
    }
}
