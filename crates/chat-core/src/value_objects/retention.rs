//! Cache retention policy

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::entities::EntityKind;

/// How much of the observed remote state the entity cache keeps.
///
/// A policy only governs future writes. Switching policies never purges
/// or backfills existing entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Keep every entity kind and request offline members of large guilds
    #[default]
    Full,
    /// Keep everything except bulk categories (guild members, message bodies)
    Minimal,
    /// Keep nothing; every read misses
    None,
}

impl RetentionPolicy {
    /// Whether entities of this kind are written under this policy
    #[must_use]
    pub fn retains(self, kind: EntityKind) -> bool {
        match self {
            Self::Full => true,
            Self::Minimal => !matches!(kind, EntityKind::GuildMember | EntityKind::Message),
            Self::None => false,
        }
    }

    /// Whether reads are served at all
    #[must_use]
    pub fn allows_reads(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether offline members of large guilds should be requested from the gateway
    #[must_use]
    pub fn requests_offline_members(self) -> bool {
        matches!(self, Self::Full)
    }

    /// Lowercase name used in configuration
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Minimal => "minimal",
            Self::None => "none",
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unrecognised policy name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown retention policy: {0}")]
pub struct RetentionPolicyParseError(pub String);

impl FromStr for RetentionPolicy {
    type Err = RetentionPolicyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "all" => Ok(Self::Full),
            "minimal" => Ok(Self::Minimal),
            "none" => Ok(Self::None),
            other => Err(RetentionPolicyParseError(other.to_string())),
        }
    }
}
