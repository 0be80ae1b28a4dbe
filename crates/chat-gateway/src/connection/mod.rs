//! Connection management
//!
//! The session state machine, its transport, heartbeats and resumable
//! session identity.

mod heartbeat;
mod manager;
mod session;
mod state;
mod transport;
mod url;

pub use heartbeat::HeartbeatClock;
pub use manager::SessionManager;
pub use session::{SequenceCheck, Session};
pub use state::{SessionState, StateTransition};
pub use transport::{GatewayConnection, GatewayTransport, Inbound, Outbound, TungsteniteTransport};
pub use url::{GatewayUrlSource, StaticGatewayUrl};
