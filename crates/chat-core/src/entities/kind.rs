//! Entity kinds known to the client

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of remote entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Channel,
    Emoji,
    Guild,
    GuildMember,
    Invite,
    Message,
    Role,
    User,
    Webhook,
}

impl EntityKind {
    /// Every kind, in declaration order
    pub const ALL: [EntityKind; 9] = [
        Self::Channel,
        Self::Emoji,
        Self::Guild,
        Self::GuildMember,
        Self::Invite,
        Self::Message,
        Self::Role,
        Self::User,
        Self::Webhook,
    ];

    /// Get the kind's name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Channel => "channel",
            Self::Emoji => "emoji",
            Self::Guild => "guild",
            Self::GuildMember => "guild_member",
            Self::Invite => "invite",
            Self::Message => "message",
            Self::Role => "role",
            Self::User => "user",
            Self::Webhook => "webhook",
        }
    }

    /// Kind of the parent entity an identifier of this kind is addressed under.
    ///
    /// Members, emojis and roles live inside a guild; messages inside a channel.
    #[must_use]
    pub fn scope_kind(self) -> Option<EntityKind> {
        match self {
            Self::GuildMember | Self::Emoji | Self::Role => Some(Self::Guild),
            Self::Message => Some(Self::Channel),
            _ => None,
        }
    }

    /// Check if references of this kind carry a parent scope
    #[inline]
    #[must_use]
    pub fn is_scoped(self) -> bool {
        self.scope_kind().is_some()
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| crate::DomainError::UnknownKind(s.to_string()))
    }
}
