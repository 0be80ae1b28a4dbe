//! Entity reference - the cache key and lookup argument

use serde::{Deserialize, Serialize};
use std::fmt;

use super::EntityKind;
use crate::value_objects::Snowflake;

/// Identifies one remote entity.
///
/// `scope` holds the parent identifier for kinds addressed inside a parent
/// (the guild of a member, emoji or role; the channel of a message). It is
/// part of the key, so the same user in two guilds yields two member references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Snowflake,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<Snowflake>,
}

impl EntityRef {
    /// Reference an unscoped entity
    #[must_use]
    pub const fn new(kind: EntityKind, id: Snowflake) -> Self {
        Self {
            kind,
            id,
            scope: None,
        }
    }

    /// Reference an entity inside a parent scope
    #[must_use]
    pub const fn scoped(kind: EntityKind, scope: Snowflake, id: Snowflake) -> Self {
        Self {
            kind,
            id,
            scope: Some(scope),
        }
    }

    #[must_use]
    pub const fn channel(id: Snowflake) -> Self {
        Self::new(EntityKind::Channel, id)
    }

    #[must_use]
    pub const fn guild(id: Snowflake) -> Self {
        Self::new(EntityKind::Guild, id)
    }

    #[must_use]
    pub const fn user(id: Snowflake) -> Self {
        Self::new(EntityKind::User, id)
    }

    #[must_use]
    pub const fn invite(id: Snowflake) -> Self {
        Self::new(EntityKind::Invite, id)
    }

    #[must_use]
    pub const fn webhook(id: Snowflake) -> Self {
        Self::new(EntityKind::Webhook, id)
    }

    /// A guild member, identified by the member's user ID
    #[must_use]
    pub const fn guild_member(guild: Snowflake, user: Snowflake) -> Self {
        Self::scoped(EntityKind::GuildMember, guild, user)
    }

    #[must_use]
    pub const fn emoji(guild: Snowflake, id: Snowflake) -> Self {
        Self::scoped(EntityKind::Emoji, guild, id)
    }

    #[must_use]
    pub const fn role(guild: Snowflake, id: Snowflake) -> Self {
        Self::scoped(EntityKind::Role, guild, id)
    }

    #[must_use]
    pub const fn message(channel: Snowflake, id: Snowflake) -> Self {
        Self::scoped(EntityKind::Message, channel, id)
    }

    /// Reference to the parent entity, if this kind is scoped
    #[must_use]
    pub fn parent(&self) -> Option<EntityRef> {
        match (self.kind.scope_kind(), self.scope) {
            (Some(kind), Some(scope)) => Some(EntityRef::new(kind, scope)),
            _ => None,
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Some(scope) => write!(f, "{}:{}/{}", self.kind, scope, self.id),
            None => write!(f, "{}:{}", self.kind, self.id),
        }
    }
}
