//! # chat-core
//!
//! Domain layer: snowflake identifiers, entity kinds and references, entity
//! snapshots, and the cache retention policy. No I/O lives here.

pub mod entities;
pub mod error;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{Entity, EntityKind, EntityRef};
pub use error::DomainError;
pub use value_objects::{RetentionPolicy, RetentionPolicyParseError, Snowflake, SnowflakeParseError};
