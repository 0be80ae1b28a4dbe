//! Gateway close codes
//!
//! Close codes the server (or the network) can end a gateway connection with,
//! and how the session reacts to each.

use serde::{Deserialize, Serialize};

/// What the session does after the connection closes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseAction {
    /// Reconnect and resume the existing session
    Resume,
    /// Reconnect with a fresh identify; the old session is discarded
    Reidentify,
    /// Stop; retrying cannot succeed
    Fatal,
}

/// Gateway close codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum CloseCode {
    /// Graceful close
    Normal = 1000,
    /// Endpoint going away
    GoingAway = 1001,
    /// Connection dropped without a close frame
    Abnormal = 1006,
    /// Unknown error occurred
    UnknownError = 4000,
    /// Invalid opcode sent
    UnknownOpcode = 4001,
    /// Invalid payload sent
    DecodeError = 4002,
    /// Payload sent before identifying
    NotAuthenticated = 4003,
    /// Invalid token in identify
    AuthenticationFailed = 4004,
    /// Identify sent twice
    AlreadyAuthenticated = 4005,
    /// Invalid sequence number on resume
    InvalidSequence = 4007,
    /// Payloads sent too quickly
    RateLimited = 4008,
    /// Session has timed out
    SessionTimeout = 4009,
    /// Invalid shard in identify
    InvalidShard = 4010,
    /// Too many guilds for one connection
    ShardingRequired = 4011,
}

impl CloseCode {
    /// Create a `CloseCode` from a raw u16 value
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1006 => Some(Self::Abnormal),
            4000 => Some(Self::UnknownError),
            4001 => Some(Self::UnknownOpcode),
            4002 => Some(Self::DecodeError),
            4003 => Some(Self::NotAuthenticated),
            4004 => Some(Self::AuthenticationFailed),
            4005 => Some(Self::AlreadyAuthenticated),
            4007 => Some(Self::InvalidSequence),
            4008 => Some(Self::RateLimited),
            4009 => Some(Self::SessionTimeout),
            4010 => Some(Self::InvalidShard),
            4011 => Some(Self::ShardingRequired),
            _ => None,
        }
    }

    /// Get the raw u16 value
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Reaction to a connection closed with this code
    #[must_use]
    pub const fn action(self) -> CloseAction {
        match self {
            Self::GoingAway
            | Self::Abnormal
            | Self::UnknownError
            | Self::UnknownOpcode
            | Self::DecodeError
            | Self::AlreadyAuthenticated
            | Self::RateLimited => CloseAction::Resume,
            Self::Normal | Self::NotAuthenticated | Self::InvalidSequence | Self::SessionTimeout => {
                CloseAction::Reidentify
            }
            Self::AuthenticationFailed | Self::InvalidShard | Self::ShardingRequired => CloseAction::Fatal,
        }
    }

    /// Reaction to a raw close code; unknown or missing codes are treated as a network drop
    #[must_use]
    pub fn action_for(code: Option<u16>) -> CloseAction {
        code.and_then(Self::from_u16)
            .map_or(CloseAction::Resume, Self::action)
    }

    /// Get the description for this close code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Normal => "Normal closure",
            Self::GoingAway => "Going away",
            Self::Abnormal => "Abnormal closure",
            Self::UnknownError => "Unknown error occurred",
            Self::UnknownOpcode => "Invalid opcode sent",
            Self::DecodeError => "Invalid payload encoding",
            Self::NotAuthenticated => "Not authenticated",
            Self::AuthenticationFailed => "Authentication failed",
            Self::AlreadyAuthenticated => "Already authenticated",
            Self::InvalidSequence => "Invalid sequence number",
            Self::RateLimited => "Rate limited",
            Self::SessionTimeout => "Session timeout",
            Self::InvalidShard => "Invalid shard configuration",
            Self::ShardingRequired => "Sharding required",
        }
    }

    /// Get the name of this close code
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::GoingAway => "GoingAway",
            Self::Abnormal => "Abnormal",
            Self::UnknownError => "UnknownError",
            Self::UnknownOpcode => "UnknownOpcode",
            Self::DecodeError => "DecodeError",
            Self::NotAuthenticated => "NotAuthenticated",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::AlreadyAuthenticated => "AlreadyAuthenticated",
            Self::InvalidSequence => "InvalidSequence",
            Self::RateLimited => "RateLimited",
            Self::SessionTimeout => "SessionTimeout",
            Self::InvalidShard => "InvalidShard",
            Self::ShardingRequired => "ShardingRequired",
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.name(), self.as_u16(), self.description())
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}
