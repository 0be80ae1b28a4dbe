//! Domain errors - failures interpreting entity payloads

use thiserror::Error;

use crate::entities::EntityKind;

/// Domain layer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("{0} payload is not a JSON object")]
    NotAnObject(EntityKind),

    #[error("{0} payload has no identifier")]
    MissingIdentifier(EntityKind),

    #[error("{0} payload has no parent scope")]
    MissingScope(EntityKind),

    #[error("Invalid snowflake: {0}")]
    InvalidSnowflake(String),

    #[error("Unknown entity kind: {0}")]
    UnknownKind(String),
}

impl DomainError {
    /// Get an error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAnObject(_) => "NOT_AN_OBJECT",
            Self::MissingIdentifier(_) => "MISSING_IDENTIFIER",
            Self::MissingScope(_) => "MISSING_SCOPE",
            Self::InvalidSnowflake(_) => "INVALID_SNOWFLAKE",
            Self::UnknownKind(_) => "UNKNOWN_KIND",
        }
    }
}
