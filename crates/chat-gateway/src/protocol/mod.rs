//! Gateway protocol definitions
//!
//! Op codes, frame format, payloads and close codes of gateway protocol version 6.

mod close_codes;
mod messages;
mod opcodes;
mod payloads;

pub use close_codes::{CloseAction, CloseCode};
pub use messages::GatewayMessage;
pub use opcodes::OpCode;
pub use payloads::{
    HelloPayload, IdentifyPayload, IdentifyProperties, PresenceUpdatePayload, ReadyPayload,
    RequestGuildMembersPayload, ResumePayload,
};

/// Gateway protocol version
pub const GATEWAY_VERSION: u8 = 6;

/// Append the version and encoding query to a gateway URL
#[must_use]
pub fn gateway_url_with_query(base: &str) -> String {
    let base = base.trim_end_matches('/');
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{base}{separator}v={GATEWAY_VERSION}&encoding=json")
}
