//! Integration test utilities for the chat client
//!
//! In-process stand-ins for the REST API and the gateway, so scenarios run
//! end to end without a network.

pub mod fixtures;
pub mod mock_gateway;
pub mod mock_http;

pub use fixtures::*;
pub use mock_gateway::*;
pub use mock_http::*;
