//! Test fixtures and data generators
//!
//! Reusable payloads and a client wired to the mocks.

use chat_client::{Client, ClientConfig};
use chat_common::RestConfig;
use chat_gateway::GatewayTransport;
use chat_rest::HttpTransport;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::mock_gateway::MockGateway;
use crate::mock_http::MockHttp;

/// Counter for unique snowflakes
static COUNTER: AtomicU64 = AtomicU64::new(80_351_110_224_678_912);

/// Get a unique identifier for test data
pub fn unique_id() -> u64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Configuration with short delays so retries finish quickly
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::new("test-token");
    config.rest = RestConfig {
        max_retries: 2,
        max_rate_limit_retries: 2,
        retry_base_delay_ms: 10,
        retry_max_delay_ms: 50,
        ..RestConfig::default()
    };
    config.gateway.backoff_initial_ms = 10;
    config.gateway.backoff_max_ms = 100;
    config.gateway.max_connect_attempts = 3;
    config
}

/// Client over the mocks, running on the current runtime
pub fn test_client(http: &Arc<MockHttp>, gateway: &Arc<MockGateway>) -> Client {
    test_client_on(http, gateway, Handle::current())
}

/// Client over the mocks, running on `runtime`
pub fn test_client_on(http: &Arc<MockHttp>, gateway: &Arc<MockGateway>, runtime: Handle) -> Client {
    test_client_with(http, gateway, test_config(), runtime)
}

/// Client over the mocks with a custom configuration
pub fn test_client_with(
    http: &Arc<MockHttp>,
    gateway: &Arc<MockGateway>,
    config: ClientConfig,
    runtime: Handle,
) -> Client {
    Client::builder()
        .config(config)
        .http_transport(Arc::clone(http) as Arc<dyn HttpTransport>)
        .gateway_transport(Arc::clone(gateway) as Arc<dyn GatewayTransport>)
        .gateway_url("wss://gateway.test")
        .runtime(runtime)
        .build()
        .expect("test client builds")
}

pub fn channel_payload(id: u64, name: &str) -> Value {
    json!({"id": id.to_string(), "type": 0, "name": name, "guild_id": "41771983423143937"})
}

pub fn user_payload(id: u64, username: &str) -> Value {
    json!({"id": id.to_string(), "username": username, "discriminator": "0001"})
}

pub fn guild_payload(id: u64, name: &str) -> Value {
    json!({
        "id": id.to_string(),
        "name": name,
        "large": false,
        "channels": [],
        "members": [],
        "roles": [],
        "emojis": []
    })
}
