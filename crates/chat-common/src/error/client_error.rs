//! Client error types
//!
//! Unified error handling for the REST dispatcher, gateway session and client facade.

use chat_core::DomainError;
use std::fmt;

use crate::config::ConfigError;

/// Client-wide error type
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    // Construction errors
    #[error("Invalid client configuration: {0}")]
    Construction(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    // Gateway errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    // Request errors
    #[error("Rate limit retries exhausted on bucket {bucket} after {attempts} attempts")]
    RateLimitExhausted { bucket: String, attempts: u32 },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Request cancelled")]
    Cancelled,

    // Payload errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Domain(#[from] DomainError),

    // Internal errors
    #[error("Internal error")]
    Internal(#[source] anyhow::Error),
}

impl ClientError {
    /// Get a stable error code string
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Construction(_) => "CONSTRUCTION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Auth(_) => "AUTH_ERROR",
            Self::RateLimitExhausted { .. } => "RATE_LIMIT_EXHAUSTED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Http { .. } => "HTTP_ERROR",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::Cancelled => "CANCELLED",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Domain(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status carried by this error, if it came from a response
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::NotFound(_) => Some(404),
            Self::RateLimitExhausted { .. } => Some(429),
            _ => None,
        }
    }

    /// Check if this error stops the affected subsystem for good.
    ///
    /// Fatal errors need explicit caller action (new client, re-`open()`).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Construction(_) | Self::Config(_) | Self::Auth(_))
    }

    /// Check if the failed operation may succeed when retried
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Protocol(_) => true,
            Self::Http { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }

    /// Check if this is a cancellation
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Create a protocol error
    #[must_use]
    pub fn protocol(msg: impl fmt::Display) -> Self {
        Self::Protocol(msg.to_string())
    }

    /// Create a connection error
    #[must_use]
    pub fn connection(msg: impl fmt::Display) -> Self {
        Self::Connection(msg.to_string())
    }

    /// Create a not found error for a resource
    #[must_use]
    pub fn not_found(resource: impl fmt::Display) -> Self {
        Self::NotFound(resource.to_string())
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

/// Result type alias for client operations
pub type ClientResult<T> = Result<T, ClientError>;
