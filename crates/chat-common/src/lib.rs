//! # chat-common
//!
//! Shared utilities: configuration, the client error type, retry policies and telemetry.

pub mod config;
pub mod error;
pub mod retry;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::{
    CacheConfig, ClientConfig, ConfigError, GatewayConfig, LogConfig, RestConfig, API_BASE,
    API_VERSION,
};
pub use error::{ClientError, ClientResult};
pub use retry::BackoffPolicy;
pub use telemetry::{
    init_tracing, init_tracing_with_config, try_init_logger, try_init_tracing,
    try_init_tracing_with_config, ConsoleLogger, LogLevel, Logger, LoggerLayer, TracingConfig,
    TracingError,
};
