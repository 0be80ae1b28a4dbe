//! REST routes and rate-limit bucket keys.

use chat_common::ClientError;
use chat_core::{EntityKind, EntityRef, Snowflake};
use std::fmt;

/// HTTP method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Patch => "PATCH",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A REST endpoint with its path parameters filled in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    GetGateway,
    GetChannel { channel_id: Snowflake },
    DeleteChannel { channel_id: Snowflake },
    GetMessage { channel_id: Snowflake, message_id: Snowflake },
    CreateMessage { channel_id: Snowflake },
    DeleteMessage { channel_id: Snowflake, message_id: Snowflake },
    GetGuild { guild_id: Snowflake },
    LeaveGuild { guild_id: Snowflake },
    GetGuildMember { guild_id: Snowflake, user_id: Snowflake },
    RemoveGuildMember { guild_id: Snowflake, user_id: Snowflake },
    GetGuildRoles { guild_id: Snowflake },
    DeleteGuildRole { guild_id: Snowflake, role_id: Snowflake },
    GetGuildEmoji { guild_id: Snowflake, emoji_id: Snowflake },
    DeleteGuildEmoji { guild_id: Snowflake, emoji_id: Snowflake },
    GetInvite { invite_id: Snowflake },
    DeleteInvite { invite_id: Snowflake },
    GetUser { user_id: Snowflake },
    GetWebhook { webhook_id: Snowflake },
    DeleteWebhook { webhook_id: Snowflake },
}

impl Route {
    #[must_use]
    pub fn method(&self) -> Method {
        match self {
            Self::GetGateway
            | Self::GetChannel { .. }
            | Self::GetMessage { .. }
            | Self::GetGuild { .. }
            | Self::GetGuildMember { .. }
            | Self::GetGuildRoles { .. }
            | Self::GetGuildEmoji { .. }
            | Self::GetInvite { .. }
            | Self::GetUser { .. }
            | Self::GetWebhook { .. } => Method::Get,
            Self::CreateMessage { .. } => Method::Post,
            Self::DeleteChannel { .. }
            | Self::DeleteMessage { .. }
            | Self::LeaveGuild { .. }
            | Self::RemoveGuildMember { .. }
            | Self::DeleteGuildRole { .. }
            | Self::DeleteGuildEmoji { .. }
            | Self::DeleteInvite { .. }
            | Self::DeleteWebhook { .. } => Method::Delete,
        }
    }

    /// Path with placeholders instead of identifiers
    #[must_use]
    pub fn template(&self) -> &'static str {
        match self {
            Self::GetGateway => "/gateway",
            Self::GetChannel { .. } | Self::DeleteChannel { .. } => "/channels/{channel_id}",
            Self::GetMessage { .. } | Self::DeleteMessage { .. } => {
                "/channels/{channel_id}/messages/{message_id}"
            }
            Self::CreateMessage { .. } => "/channels/{channel_id}/messages",
            Self::GetGuild { .. } => "/guilds/{guild_id}",
            Self::LeaveGuild { .. } => "/users/@me/guilds/{guild_id}",
            Self::GetGuildMember { .. } | Self::RemoveGuildMember { .. } => {
                "/guilds/{guild_id}/members/{user_id}"
            }
            Self::GetGuildRoles { .. } => "/guilds/{guild_id}/roles",
            Self::DeleteGuildRole { .. } => "/guilds/{guild_id}/roles/{role_id}",
            Self::GetGuildEmoji { .. } | Self::DeleteGuildEmoji { .. } => {
                "/guilds/{guild_id}/emojis/{emoji_id}"
            }
            Self::GetInvite { .. } | Self::DeleteInvite { .. } => "/invites/{invite_id}",
            Self::GetUser { .. } => "/users/{user_id}",
            Self::GetWebhook { .. } | Self::DeleteWebhook { .. } => "/webhooks/{webhook_id}",
        }
    }

    /// Concrete request path
    #[must_use]
    pub fn path(&self) -> String {
        match *self {
            Self::GetGateway => "/gateway".to_string(),
            Self::GetChannel { channel_id } | Self::DeleteChannel { channel_id } => {
                format!("/channels/{channel_id}")
            }
            Self::GetMessage { channel_id, message_id }
            | Self::DeleteMessage { channel_id, message_id } => {
                format!("/channels/{channel_id}/messages/{message_id}")
            }
            Self::CreateMessage { channel_id } => format!("/channels/{channel_id}/messages"),
            Self::GetGuild { guild_id } => format!("/guilds/{guild_id}"),
            Self::LeaveGuild { guild_id } => format!("/users/@me/guilds/{guild_id}"),
            Self::GetGuildMember { guild_id, user_id }
            | Self::RemoveGuildMember { guild_id, user_id } => {
                format!("/guilds/{guild_id}/members/{user_id}")
            }
            Self::GetGuildRoles { guild_id } => format!("/guilds/{guild_id}/roles"),
            Self::DeleteGuildRole { guild_id, role_id } => format!("/guilds/{guild_id}/roles/{role_id}"),
            Self::GetGuildEmoji { guild_id, emoji_id }
            | Self::DeleteGuildEmoji { guild_id, emoji_id } => {
                format!("/guilds/{guild_id}/emojis/{emoji_id}")
            }
            Self::GetInvite { invite_id } | Self::DeleteInvite { invite_id } => {
                format!("/invites/{invite_id}")
            }
            Self::GetUser { user_id } => format!("/users/{user_id}"),
            Self::GetWebhook { webhook_id } | Self::DeleteWebhook { webhook_id } => {
                format!("/webhooks/{webhook_id}")
            }
        }
    }

    /// Rate-limit bucket key: method plus route template.
    ///
    /// Distinct resources behind the same template share a bucket.
    #[must_use]
    pub fn bucket_key(&self) -> String {
        format!("{} {}", self.method(), self.template())
    }

    /// Route that fetches the referenced entity.
    ///
    /// Roles have no single-item endpoint; their fetch returns the guild's role list.
    pub fn fetch(reference: &EntityRef) -> Result<Self, ClientError> {
        let id = reference.id;
        Ok(match reference.kind {
            EntityKind::Channel => Self::GetChannel { channel_id: id },
            EntityKind::Guild => Self::GetGuild { guild_id: id },
            EntityKind::User => Self::GetUser { user_id: id },
            EntityKind::Invite => Self::GetInvite { invite_id: id },
            EntityKind::Webhook => Self::GetWebhook { webhook_id: id },
            EntityKind::GuildMember => Self::GetGuildMember {
                guild_id: required_scope(reference)?,
                user_id: id,
            },
            EntityKind::Emoji => Self::GetGuildEmoji {
                guild_id: required_scope(reference)?,
                emoji_id: id,
            },
            EntityKind::Role => Self::GetGuildRoles {
                guild_id: required_scope(reference)?,
            },
            EntityKind::Message => Self::GetMessage {
                channel_id: required_scope(reference)?,
                message_id: id,
            },
        })
    }

    /// Route that deletes (or, for guilds, leaves) the referenced entity
    pub fn delete(reference: &EntityRef) -> Result<Self, ClientError> {
        let id = reference.id;
        Ok(match reference.kind {
            EntityKind::Channel => Self::DeleteChannel { channel_id: id },
            EntityKind::Guild => Self::LeaveGuild { guild_id: id },
            EntityKind::Invite => Self::DeleteInvite { invite_id: id },
            EntityKind::Webhook => Self::DeleteWebhook { webhook_id: id },
            EntityKind::GuildMember => Self::RemoveGuildMember {
                guild_id: required_scope(reference)?,
                user_id: id,
            },
            EntityKind::Emoji => Self::DeleteGuildEmoji {
                guild_id: required_scope(reference)?,
                emoji_id: id,
            },
            EntityKind::Role => Self::DeleteGuildRole {
                guild_id: required_scope(reference)?,
                role_id: id,
            },
            EntityKind::Message => Self::DeleteMessage {
                channel_id: required_scope(reference)?,
                message_id: id,
            },
            EntityKind::User => {
                return Err(ClientError::InvalidRequest("users cannot be deleted".to_string()))
            }
        })
    }
}

fn required_scope(reference: &EntityRef) -> Result<Snowflake, ClientError> {
    reference.scope.ok_or_else(|| {
        ClientError::InvalidRequest(format!("{} needs a parent scope", reference.kind))
    })
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method(), self.path())
    }
}
