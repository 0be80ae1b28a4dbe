//! # chat-cache
//!
//! In-memory cache of remote entities, fed by gateway events and REST fetches.
//!
//! ## Example
//!
//! ```ignore
//! use chat_cache::EntityCache;
//! use chat_core::{EntityRef, RetentionPolicy, Snowflake};
//!
//! let cache = EntityCache::new(RetentionPolicy::Minimal);
//! let version = cache.next_version();
//! cache.put(entity, version);
//!
//! let hit = cache.get(&EntityRef::channel(Snowflake::new(41771983423143937)));
//! ```

mod entity_cache;
mod version;

pub use entity_cache::{CachedEntity, EntityCache, MAX_TOMBSTONES};
pub use version::{Version, VersionClock};
