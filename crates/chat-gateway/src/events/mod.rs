//! Gateway events
//!
//! Dispatch event names, their cache effects, and the handlers events are
//! forwarded to.

mod apply;
mod event;
mod event_types;
mod handler;

pub use apply::apply_event;
pub use event::GatewayEvent;
pub use event_types::GatewayEventType;
pub use handler::{handler_fn, EventHandler, EventHandlers, FnHandler, HandlerId};
