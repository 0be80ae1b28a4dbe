//! Cache effects of dispatch events
//!
//! Every applied event takes one version from the cache clock; all entities
//! it writes or deletes share that version.

use super::GatewayEventType;
use chat_cache::{EntityCache, Version};
use chat_core::{DomainError, Entity, EntityKind, EntityRef, Snowflake};
use serde_json::Value;

/// Nested collections stripped from guild snapshots; they are cached as
/// entities of their own
const GUILD_NESTED_FIELDS: [&str; 5] = ["channels", "members", "roles", "emojis", "presences"];

/// Apply one dispatch event to the cache.
///
/// Returns the references of every entity the event touched. Nested items
/// that cannot be parsed are skipped with a warning; a malformed top-level
/// payload is an error.
pub fn apply_event(
    cache: &EntityCache,
    kind: GatewayEventType,
    data: &Value,
) -> Result<Vec<EntityRef>, DomainError> {
    let mut apply = Apply {
        cache,
        version: cache.next_version(),
        affected: Vec::new(),
    };

    match kind {
        GatewayEventType::Ready => apply.ready(data),
        GatewayEventType::Resumed => Ok(()),

        GatewayEventType::ChannelCreate | GatewayEventType::ChannelUpdate => {
            apply.upsert(EntityKind::Channel, None, data).map(drop)
        }
        GatewayEventType::ChannelDelete => apply.channel_delete(data),
        GatewayEventType::ChannelPinsUpdate => {
            let channel = required(data, "channel_id", EntityKind::Channel)?;
            let mut update = serde_json::Map::new();
            update.insert("id".to_string(), Value::String(channel.to_string()));
            if let Some(pinned) = data.get("last_pin_timestamp") {
                update.insert("last_pin_timestamp".to_string(), pinned.clone());
            }
            apply.upsert(EntityKind::Channel, None, &Value::Object(update)).map(drop)
        }

        GatewayEventType::GuildCreate | GatewayEventType::GuildUpdate => apply.guild(data),
        GatewayEventType::GuildDelete => apply.guild_delete(data),
        GatewayEventType::GuildBanAdd | GatewayEventType::GuildBanRemove => {
            let guild = required(data, "guild_id", EntityKind::Guild)?;
            apply.touch(EntityRef::guild(guild));
            apply.nested_user(data.get("user"));
            Ok(())
        }
        GatewayEventType::GuildEmojisUpdate => apply.emojis_update(data),
        GatewayEventType::GuildIntegrationsUpdate | GatewayEventType::WebhooksUpdate => {
            if let Some(guild) = data.get("guild_id").and_then(Snowflake::from_json) {
                apply.touch(EntityRef::guild(guild));
            }
            if let Some(channel) = data.get("channel_id").and_then(Snowflake::from_json) {
                apply.touch(EntityRef::channel(channel));
            }
            Ok(())
        }

        GatewayEventType::GuildMemberAdd | GatewayEventType::GuildMemberUpdate => {
            apply.nested_user(data.get("user"));
            apply.upsert(EntityKind::GuildMember, None, data).map(drop)
        }
        GatewayEventType::GuildMemberRemove => {
            let guild = required(data, "guild_id", EntityKind::GuildMember)?;
            let user = data
                .get("user")
                .and_then(|user| user.get("id"))
                .and_then(Snowflake::from_json)
                .ok_or(DomainError::MissingIdentifier(EntityKind::GuildMember))?;
            apply.delete(EntityRef::guild_member(guild, user));
            Ok(())
        }
        GatewayEventType::GuildMembersChunk => {
            let guild = required(data, "guild_id", EntityKind::GuildMember)?;
            apply.touch(EntityRef::guild(guild));
            for member in array(data, "members") {
                apply.nested_user(member.get("user"));
                apply.nested(EntityKind::GuildMember, Some(guild), member);
            }
            Ok(())
        }

        GatewayEventType::GuildRoleCreate | GatewayEventType::GuildRoleUpdate => {
            let guild = required(data, "guild_id", EntityKind::Role)?;
            let role = data.get("role").ok_or(DomainError::NotAnObject(EntityKind::Role))?;
            apply.upsert(EntityKind::Role, Some(guild), role).map(drop)
        }
        GatewayEventType::GuildRoleDelete => {
            let guild = required(data, "guild_id", EntityKind::Role)?;
            let role = required(data, "role_id", EntityKind::Role)?;
            apply.delete(EntityRef::role(guild, role));
            Ok(())
        }

        GatewayEventType::MessageCreate | GatewayEventType::MessageUpdate => {
            apply.nested_user(data.get("author"));
            apply.upsert(EntityKind::Message, None, data).map(drop)
        }
        GatewayEventType::MessageDelete => {
            let channel = required(data, "channel_id", EntityKind::Message)?;
            let id = required(data, "id", EntityKind::Message)?;
            apply.delete(EntityRef::message(channel, id));
            Ok(())
        }
        GatewayEventType::MessageDeleteBulk => {
            let channel = required(data, "channel_id", EntityKind::Message)?;
            for id in array(data, "ids").iter().filter_map(Snowflake::from_json) {
                apply.delete(EntityRef::message(channel, id));
            }
            Ok(())
        }
        GatewayEventType::MessageReactionAdd
        | GatewayEventType::MessageReactionRemove
        | GatewayEventType::MessageReactionRemoveAll => {
            let channel = required(data, "channel_id", EntityKind::Message)?;
            let message = required(data, "message_id", EntityKind::Message)?;
            apply.touch(EntityRef::message(channel, message));
            Ok(())
        }

        GatewayEventType::PresenceUpdate => {
            apply.nested_user(data.get("user"));
            Ok(())
        }
        GatewayEventType::TypingStart => {
            let channel = required(data, "channel_id", EntityKind::Channel)?;
            apply.touch(EntityRef::channel(channel));
            if let Some(user) = data.get("user_id").and_then(Snowflake::from_json) {
                apply.touch(EntityRef::user(user));
            }
            Ok(())
        }
        GatewayEventType::UserUpdate => apply.upsert(EntityKind::User, None, data).map(drop),
    }?;

    Ok(apply.affected)
}

struct Apply<'a> {
    cache: &'a EntityCache,
    version: Version,
    affected: Vec<EntityRef>,
}

impl Apply<'_> {
    fn touch(&mut self, reference: EntityRef) {
        if !self.affected.contains(&reference) {
            self.affected.push(reference);
        }
    }

    fn upsert(
        &mut self,
        kind: EntityKind,
        scope: Option<Snowflake>,
        payload: &Value,
    ) -> Result<EntityRef, DomainError> {
        let entity = Entity::from_payload(kind, scope, payload)?;
        let reference = *entity.reference();
        self.cache.upsert(entity, self.version);
        self.touch(reference);
        Ok(reference)
    }

    /// Upsert an item nested in a larger payload, skipping it if malformed
    fn nested(&mut self, kind: EntityKind, scope: Option<Snowflake>, payload: &Value) {
        if let Err(error) = self.upsert(kind, scope, payload) {
            tracing::warn!(kind = %kind, error = %error, "Skipping malformed nested entity");
        }
    }

    fn nested_user(&mut self, user: Option<&Value>) {
        if let Some(user) = user {
            self.nested(EntityKind::User, None, user);
        }
    }

    fn delete(&mut self, reference: EntityRef) {
        self.cache.remove_at(&reference, self.version);
        self.touch(reference);
    }

    fn ready(&mut self, data: &Value) -> Result<(), DomainError> {
        self.nested_user(data.get("user"));
        for channel in array(data, "private_channels") {
            self.nested(EntityKind::Channel, None, channel);
        }
        for guild in array(data, "guilds") {
            self.nested(EntityKind::Guild, None, guild);
        }
        Ok(())
    }

    fn guild(&mut self, data: &Value) -> Result<(), DomainError> {
        let mut snapshot = data.clone();
        if let Some(object) = snapshot.as_object_mut() {
            for field in GUILD_NESTED_FIELDS {
                object.remove(field);
            }
        }
        let guild = self.upsert(EntityKind::Guild, None, &snapshot)?.id;

        for channel in array(data, "channels") {
            // Channels inside GUILD_CREATE omit their guild
            let mut channel = channel.clone();
            if let Some(object) = channel.as_object_mut() {
                object
                    .entry("guild_id")
                    .or_insert_with(|| Value::String(guild.to_string()));
            }
            self.nested(EntityKind::Channel, None, &channel);
        }
        for member in array(data, "members") {
            self.nested_user(member.get("user"));
            self.nested(EntityKind::GuildMember, Some(guild), member);
        }
        for role in array(data, "roles") {
            self.nested(EntityKind::Role, Some(guild), role);
        }
        for emoji in array(data, "emojis") {
            self.nested(EntityKind::Emoji, Some(guild), emoji);
        }
        Ok(())
    }

    fn guild_delete(&mut self, data: &Value) -> Result<(), DomainError> {
        let guild = required(data, "id", EntityKind::Guild)?;
        let reference = EntityRef::guild(guild);

        if data.get("unavailable").and_then(Value::as_bool).unwrap_or(false) {
            // Outage: keep the guild, mark it unavailable
            self.upsert(EntityKind::Guild, None, data)?;
            return Ok(());
        }

        self.delete(reference);
        let scoped = self.cache.remove_scoped(&reference);
        let guild_id = guild.to_string();
        let mut channels = 0;
        for channel in self.cache.entities_of(EntityKind::Channel) {
            if channel.get_str("guild_id") == Some(guild_id.as_str()) {
                self.delete(*channel.reference());
                self.cache.remove_scoped(channel.reference());
                channels += 1;
            }
        }
        tracing::debug!(guild = %guild, scoped, channels, "Dropped guild from cache");
        Ok(())
    }

    fn channel_delete(&mut self, data: &Value) -> Result<(), DomainError> {
        let channel = required(data, "id", EntityKind::Channel)?;
        let reference = EntityRef::channel(channel);
        self.delete(reference);
        self.cache.remove_scoped(&reference);
        Ok(())
    }

    fn emojis_update(&mut self, data: &Value) -> Result<(), DomainError> {
        let guild = required(data, "guild_id", EntityKind::Emoji)?;
        self.touch(EntityRef::guild(guild));

        let emojis = array(data, "emojis");
        let kept: Vec<Snowflake> = emojis
            .iter()
            .filter_map(|emoji| emoji.get("id").and_then(Snowflake::from_json))
            .collect();

        for stale in self.cache.entities_in(EntityKind::Emoji, guild) {
            if !kept.contains(&stale.id()) {
                self.delete(*stale.reference());
            }
        }
        for emoji in emojis {
            self.nested(EntityKind::Emoji, Some(guild), emoji);
        }
        Ok(())
    }
}

fn required(data: &Value, field: &str, kind: EntityKind) -> Result<Snowflake, DomainError> {
    match data.get(field) {
        None | Some(Value::Null) => Err(DomainError::MissingIdentifier(kind)),
        Some(value) => Snowflake::from_json(value).ok_or_else(|| DomainError::InvalidSnowflake(value.to_string())),
    }
}

fn array<'a>(data: &'a Value, field: &str) -> &'a [Value] {
    data.get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}
