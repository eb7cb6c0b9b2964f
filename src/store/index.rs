//! Key → digest lookup index.

use dashmap::DashMap;

use crate::domain::{CacheKey, CasId};

/// Maps opaque client cache keys to artifact digests.
///
/// Deliberately independent of the content store: many keys can point
/// at the same deduplicated artifact, and key churn must never force a
/// payload copy. Each association is atomic per key; concurrent writers
/// for the same key race with last-writer-wins and no ordering promise
/// beyond that.
#[derive(Default)]
pub struct LookupIndex {
    entries: DashMap<CacheKey, CasId>,
}

impl LookupIndex {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Record or overwrite the mapping for `key`.
    pub fn associate(&self, key: CacheKey, id: CasId) {
        self.entries.insert(key, id);
    }

    pub fn resolve(&self, key: &CacheKey) -> Option<CasId> {
        self.entries.get(key).map(|entry| *entry.value())
    }

    /// Drop a stale association, but only while it still points at
    /// `expected`. Lookups use this for lazy invalidation after an
    /// eviction without clobbering a racing re-association.
    pub fn remove_if_stale(&self, key: &CacheKey, expected: &CasId) {
        self.entries
            .remove_if(key, |_, current| current == expected);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(bytes: &[u8]) -> CacheKey {
        CacheKey::from(bytes)
    }

    #[test]
    fn resolve_unknown_key_misses() {
        let index = LookupIndex::new();
        assert!(index.resolve(&key(b"missing")).is_none());
    }

    #[test]
    fn later_association_wins() {
        let index = LookupIndex::new();
        let old = CasId::compute(b"old");
        let new = CasId::compute(b"new");

        index.associate(key(b"k"), old);
        index.associate(key(b"k"), new);

        assert_eq!(index.resolve(&key(b"k")), Some(new));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_if_stale_spares_reassociated_keys() {
        let index = LookupIndex::new();
        let evicted = CasId::compute(b"evicted");
        let fresh = CasId::compute(b"fresh");

        index.associate(key(b"k"), evicted);
        index.remove_if_stale(&key(b"k"), &evicted);
        assert!(index.resolve(&key(b"k")).is_none());

        index.associate(key(b"k"), fresh);
        index.remove_if_stale(&key(b"k"), &evicted);
        assert_eq!(index.resolve(&key(b"k")), Some(fresh));
    }
}
