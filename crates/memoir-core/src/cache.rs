//! Cache coherence layer.
//!
//! Two invalidation strategies, matching the two access patterns:
//!
//! - point entries (`diary_entry_<id>_user_<uid>`) are removed directly when
//!   the entity changes;
//! - list entries are tagged with the version of a named group observed when
//!   the underlying read began. Invalidating the group rotates its version,
//!   which orphans every tagged entry at once. The paginated key space is
//!   unbounded, so nothing ever enumerates keys; orphaned and expired slots
//!   are freed lazily when a `get` lands on them.
//!
//! TTL is a ceiling only; group rotation is the correctness mechanism.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use memoir_types::{EntryImage, EntryView, PaginatedEntries};
use tracing::debug;
use uuid::Uuid;

struct Slot<V> {
    value: V,
    expires_at: Instant,
    group: Option<(String, u64)>,
}

pub struct TtlCache<V> {
    entries: RwLock<HashMap<String, Slot<V>>>,
    groups: RwLock<HashMap<String, u64>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a live value. Expired or group-stale entries read as absent and
    /// are freed in place, so dead slots never accumulate in the open-ended
    /// list-key space.
    pub fn get(&self, key: &str) -> Option<V> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            let slot = entries.get(key)?;
            if self.is_live(slot) {
                return Some(slot.value.clone());
            }
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(slot) = entries.get(key) {
            // A concurrent `set` may have replaced the slot between the locks.
            if self.is_live(slot) {
                return Some(slot.value.clone());
            }
            entries.remove(key);
        }
        None
    }

    fn is_live(&self, slot: &Slot<V>) -> bool {
        if Instant::now() >= slot.expires_at {
            return false;
        }
        match &slot.group {
            Some((group, tagged)) => {
                let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
                groups.get(group).copied().unwrap_or(0) == *tagged
            }
            None => true,
        }
    }

    /// Store a point entry, evicted only by `remove` or TTL.
    pub fn set(&self, key: &str, value: V, ttl: Duration) {
        self.insert(key, value, ttl, None);
    }

    /// Store a list entry under `group`, tagged with `version`.
    ///
    /// `version` must be the value of [`group_version`](Self::group_version)
    /// observed *before* the underlying data was read: if the group rotates
    /// between that read and this publish, the entry arrives already stale
    /// and the next `get` treats it as a miss.
    pub fn set_grouped(&self, key: &str, value: V, ttl: Duration, group: &str, version: u64) {
        self.insert(key, value, ttl, Some((group.to_string(), version)));
    }

    fn insert(&self, key: &str, value: V, ttl: Duration, group: Option<(String, u64)>) {
        let slot = Slot {
            value,
            expires_at: Instant::now() + ttl,
            group,
        };
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), slot);
    }

    /// The group's current version, creating the group at version 0 on first
    /// use.
    pub fn group_version(&self, group: &str) -> u64 {
        {
            let groups = self.groups.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(v) = groups.get(group) {
                return *v;
            }
        }
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        *groups.entry(group.to_string()).or_insert(0)
    }

    /// Rotate the group's version, atomically orphaning every entry tagged
    /// with the old one.
    pub fn invalidate_group(&self, group: &str) {
        let mut groups = self.groups.write().unwrap_or_else(PoisonError::into_inner);
        let version = groups.entry(group.to_string()).or_insert(0);
        *version += 1;
        debug!(group, version = *version, "cache group rotated");
    }

    /// Point invalidation.
    pub fn remove(&self, key: &str) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Key shapes shared by the store and the query engine.
pub fn detail_key(entry_id: Uuid, user_id: Uuid) -> String {
    format!("diary_entry_{entry_id}_user_{user_id}")
}

pub fn image_key(image_id: Uuid, user_id: Uuid) -> String {
    format!("entry_image_{image_id}_user_{user_id}")
}

/// Invalidation group covering every cached list for one user.
pub fn user_group(user_id: Uuid) -> String {
    format!("entries_user_{user_id}")
}

/// The shared cache instances of the diary core, one per cached value type.
pub struct DiaryCaches {
    pub lists: TtlCache<PaginatedEntries>,
    pub details: TtlCache<EntryView>,
    pub images: TtlCache<EntryImage>,
}

impl DiaryCaches {
    pub fn new() -> Self {
        Self {
            lists: TtlCache::new(),
            details: TtlCache::new(),
            images: TtlCache::new(),
        }
    }

    /// Every write to an entry drops its point entries and rotates the
    /// owner's list group; unrelated keys stay untouched.
    pub fn invalidate_entry_writes(&self, user_id: Uuid, entry_id: Uuid, image_id: Option<Uuid>) {
        self.details.remove(&detail_key(entry_id, user_id));
        if let Some(image_id) = image_id {
            self.images.remove(&image_key(image_id, user_id));
        }
        self.lists.invalidate_group(&user_group(user_id));
    }
}

impl Default for DiaryCaches {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_secs(3600);

    #[test]
    fn point_set_get_remove() {
        let cache = TtlCache::new();
        cache.set("k", 42, LONG);
        assert_eq!(cache.get("k"), Some(42));
        cache.remove("k");
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn ttl_expiry_reads_as_absent() {
        let cache = TtlCache::new();
        cache.set("k", 1, Duration::ZERO);
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn group_rotation_orphans_entries_before_ttl() {
        let cache = TtlCache::new();
        let version = cache.group_version("entries_user_a");
        cache.set_grouped("page_1", "cached", LONG, "entries_user_a", version);
        assert_eq!(cache.get("page_1"), Some("cached"));

        cache.invalidate_group("entries_user_a");
        assert_eq!(cache.get("page_1"), None);
    }

    #[test]
    fn rotation_does_not_touch_other_groups() {
        let cache = TtlCache::new();
        let va = cache.group_version("user_a");
        let vb = cache.group_version("user_b");
        cache.set_grouped("a_page", 1, LONG, "user_a", va);
        cache.set_grouped("b_page", 2, LONG, "user_b", vb);

        cache.invalidate_group("user_a");
        assert_eq!(cache.get("a_page"), None);
        assert_eq!(cache.get("b_page"), Some(2));
    }

    #[test]
    fn write_after_rotation_with_stale_version_is_already_dead() {
        let cache = TtlCache::new();
        // Reader captures the version, then a writer rotates the group before
        // the reader publishes its result.
        let version = cache.group_version("g");
        cache.invalidate_group("g");
        cache.set_grouped("k", 1, LONG, "g", version);
        assert_eq!(cache.get("k"), None);

        // A publish that observed the rotated version is live.
        let fresh = cache.group_version("g");
        cache.set_grouped("k", 2, LONG, "g", fresh);
        assert_eq!(cache.get("k"), Some(2));
    }

    #[test]
    fn dead_slots_are_freed_on_read() {
        let cache = TtlCache::new();
        for i in 0..1000 {
            cache.set(&format!("k{i}"), i, Duration::ZERO);
        }
        for i in 0..1000 {
            assert_eq!(cache.get(&format!("k{i}")), None);
        }
        let resident = cache.entries.read().unwrap().len();
        assert_eq!(resident, 0, "expired slots still resident: {resident}");

        let version = cache.group_version("g");
        cache.set_grouped("page", 1, LONG, "g", version);
        cache.invalidate_group("g");
        assert_eq!(cache.get("page"), None);
        assert_eq!(cache.entries.read().unwrap().len(), 0);
    }

    #[test]
    fn point_entries_ignore_group_rotation() {
        let cache = TtlCache::new();
        cache.set("detail", 7, LONG);
        cache.invalidate_group("anything");
        assert_eq!(cache.get("detail"), Some(7));
    }
}
