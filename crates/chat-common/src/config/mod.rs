//! Configuration structs

mod client_config;

pub use client_config::{
    CacheConfig, ClientConfig, ConfigError, GatewayConfig, LogConfig, RestConfig, API_BASE,
    API_VERSION,
};
