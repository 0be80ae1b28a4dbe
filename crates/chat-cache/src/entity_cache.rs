//! In-memory entity cache.
//!
//! Maps entity references to their last known snapshot. Writes are gated by
//! version: a write whose version is not newer than the stored one (or than a
//! recorded deletion) is discarded, so late or reordered writes never regress
//! an entry.

use chat_core::{Entity, EntityKind, EntityRef, RetentionPolicy, Snowflake};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::version::{Version, VersionClock};

/// Deletion markers kept before the oldest are evicted
pub const MAX_TOMBSTONES: usize = 4096;

/// A cached snapshot with its version
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntity {
    pub entity: Entity,
    pub version: Version,
    pub updated_at: DateTime<Utc>,
}

/// How a write combines with an existing entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Replace,
    Merge,
}

/// Concurrent entity cache.
///
/// Reads never block on I/O. Entries are sharded, so a writer only holds the
/// shard of the entry it is updating.
#[derive(Debug)]
pub struct EntityCache {
    entries: DashMap<EntityRef, CachedEntity>,
    tombstones: DashMap<EntityRef, Version>,
    policy: RwLock<RetentionPolicy>,
    clock: VersionClock,
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl EntityCache {
    /// Create an empty cache with the given retention policy
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            entries: DashMap::new(),
            tombstones: DashMap::new(),
            policy: RwLock::new(policy),
            clock: VersionClock::new(),
        }
    }

    /// Take a version for an upcoming write
    pub fn next_version(&self) -> Version {
        self.clock.next()
    }

    /// Last version handed out by [`next_version`](Self::next_version)
    #[must_use]
    pub fn current_version(&self) -> Version {
        self.clock.current()
    }

    #[must_use]
    pub fn retention_policy(&self) -> RetentionPolicy {
        *self.policy.read()
    }

    /// Change the policy for future writes. Existing entries are kept.
    pub fn set_retention_policy(&self, policy: RetentionPolicy) {
        let previous = std::mem::replace(&mut *self.policy.write(), policy);
        if previous != policy {
            tracing::info!(from = %previous, to = %policy, "Cache retention policy changed");
        }
    }

    /// Insert or replace an entry if `version` is newer than the stored one.
    ///
    /// Returns whether the write happened.
    pub fn put(&self, entity: Entity, version: Version) -> bool {
        self.write(entity, version, WriteMode::Replace)
    }

    /// Like [`put`](Self::put), but overlays the entity's fields onto the
    /// stored snapshot instead of replacing it.
    pub fn upsert(&self, entity: Entity, version: Version) -> bool {
        self.write(entity, version, WriteMode::Merge)
    }

    fn write(&self, entity: Entity, version: Version, mode: WriteMode) -> bool {
        let reference = *entity.reference();
        if !self.retention_policy().retains(reference.kind) {
            return false;
        }

        if self
            .tombstones
            .get(&reference)
            .is_some_and(|deleted| *deleted >= version)
        {
            tracing::trace!(entity = %reference, %version, "Skipping write older than deletion");
            return false;
        }

        let written = match self.entries.entry(reference) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get_mut();
                if version <= current.version {
                    tracing::trace!(
                        entity = %reference,
                        %version,
                        stored = %current.version,
                        "Discarding stale cache write"
                    );
                    false
                } else {
                    match mode {
                        WriteMode::Replace => current.entity = entity,
                        WriteMode::Merge => current.entity.merge(&entity),
                    }
                    current.version = version;
                    current.updated_at = Utc::now();
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CachedEntity {
                    entity,
                    version,
                    updated_at: Utc::now(),
                });
                true
            }
        };

        if written {
            self.tombstones.remove(&reference);
        }
        written
    }

    /// Get a cached entry. Always misses under [`RetentionPolicy::None`].
    #[must_use]
    pub fn get(&self, reference: &EntityRef) -> Option<CachedEntity> {
        if !self.retention_policy().allows_reads() {
            return None;
        }
        self.entries.get(reference).map(|entry| entry.value().clone())
    }

    /// Get just the snapshot of a cached entry
    #[must_use]
    pub fn get_entity(&self, reference: &EntityRef) -> Option<Entity> {
        self.get(reference).map(|cached| cached.entity)
    }

    #[must_use]
    pub fn contains(&self, reference: &EntityRef) -> bool {
        self.get(reference).is_some()
    }

    /// Delete an entry unconditionally
    pub fn remove(&self, reference: &EntityRef) -> Option<CachedEntity> {
        self.entries.remove(reference).map(|(_, cached)| cached)
    }

    /// Delete an entry and reject later writes with a version up to `version`.
    ///
    /// No marker is kept for kinds the current policy does not store. At most
    /// [`MAX_TOMBSTONES`] markers are kept; the oldest are evicted first.
    pub fn remove_at(&self, reference: &EntityRef, version: Version) -> Option<CachedEntity> {
        if self.retention_policy().retains(reference.kind) {
            self.tombstones
                .entry(*reference)
                .and_modify(|deleted| *deleted = (*deleted).max(version))
                .or_insert(version);
            if self.tombstones.len() > MAX_TOMBSTONES {
                self.prune_tombstones();
            }
        }
        self.remove(reference)
    }

    /// Keep only the newest half of the deletion markers
    fn prune_tombstones(&self) {
        let mut versions: Vec<Version> = self.tombstones.iter().map(|marker| *marker.value()).collect();
        if versions.len() <= MAX_TOMBSTONES {
            return;
        }
        versions.sort_unstable();
        let cutoff = versions[versions.len() - MAX_TOMBSTONES / 2];
        self.tombstones.retain(|_, deleted| *deleted >= cutoff);
        tracing::debug!(%cutoff, kept = self.tombstones.len(), "Pruned deletion markers");
    }

    /// Delete every entry scoped under a guild or channel; returns the count
    pub fn remove_scoped(&self, parent: &EntityRef) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|reference, _| reference.parent().as_ref() != Some(parent));
        before.saturating_sub(self.entries.len())
    }

    /// Snapshots of every cached entity of a kind
    #[must_use]
    pub fn entities_of(&self, kind: EntityKind) -> Vec<Entity> {
        if !self.retention_policy().allows_reads() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|entry| entry.key().kind == kind)
            .map(|entry| entry.value().entity.clone())
            .collect()
    }

    /// Snapshots of every entity scoped under `scope` with the given kind
    #[must_use]
    pub fn entities_in(&self, kind: EntityKind, scope: Snowflake) -> Vec<Entity> {
        self.entities_of(kind)
            .into_iter()
            .filter(|entity| entity.reference().scope == Some(scope))
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and deletion marker
    pub fn clear(&self) {
        self.entries.clear();
        self.tombstones.clear();
    }
}
