//! # chat-gateway
//!
//! Client side of the real-time gateway: the session state machine, the
//! wire protocol, and how dispatch events flow into the entity cache and on
//! to event handlers.
//!
//! ## Example
//!
//! ```ignore
//! let manager = SessionManager::new(token, config.gateway, cache, handlers, dispatcher, transport);
//! manager.open()?;
//! let mut transitions = manager.subscribe_transitions();
//! while let Ok(change) = transitions.recv().await {
//!     println!("{} -> {}", change.from, change.to);
//! }
//! ```

pub mod connection;
pub mod events;
pub mod protocol;

pub use connection::{
    GatewayConnection, GatewayTransport, GatewayUrlSource, SessionManager, SessionState,
    StateTransition, StaticGatewayUrl, TungsteniteTransport,
};
pub use events::{handler_fn, EventHandler, EventHandlers, GatewayEvent, GatewayEventType, HandlerId};
pub use protocol::{CloseAction, CloseCode, OpCode, PresenceUpdatePayload};
