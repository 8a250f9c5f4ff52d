//! Bidirectional collection registry.
//!
//! Tracks which backend collections each cached query reads, so a change
//! to a collection can find every affected key without scanning the cache.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use happylife_types::Collection;

use super::keys::QueryKey;
use super::lock::{rw_read, rw_write};

const TARGET: &str = "happylife::cache::registry";

/// Tracks collection → query keys and query key → collections mappings.
pub struct CollectionRegistry {
    collection_to_keys: RwLock<HashMap<Collection, HashSet<QueryKey>>>,
    key_to_collections: RwLock<HashMap<QueryKey, HashSet<Collection>>>,
}

impl CollectionRegistry {
    pub fn new() -> Self {
        Self {
            collection_to_keys: RwLock::new(HashMap::new()),
            key_to_collections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a query key with the collections it reads.
    ///
    /// Re-registering a key replaces its previous collection set.
    pub fn register(&self, key: QueryKey, collections: impl IntoIterator<Item = Collection>) {
        let collections: HashSet<Collection> = collections.into_iter().collect();
        let mut c2k = rw_write(&self.collection_to_keys, TARGET, "register");
        let mut k2c = rw_write(&self.key_to_collections, TARGET, "register");

        if let Some(previous) = k2c.remove(&key) {
            for collection in previous.difference(&collections) {
                if let Some(keys) = c2k.get_mut(collection) {
                    keys.remove(&key);
                    if keys.is_empty() {
                        c2k.remove(collection);
                    }
                }
            }
        }

        for collection in &collections {
            c2k.entry(*collection).or_default().insert(key.clone());
        }
        k2c.insert(key, collections);
    }

    pub fn keys_for(&self, collection: Collection) -> HashSet<QueryKey> {
        rw_read(&self.collection_to_keys, TARGET, "keys_for")
            .get(&collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn collections_for(&self, key: &QueryKey) -> HashSet<Collection> {
        rw_read(&self.key_to_collections, TARGET, "collections_for")
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove a key and clean up collection mappings. Called on eviction.
    pub fn unregister(&self, key: &QueryKey) {
        let mut c2k = rw_write(&self.collection_to_keys, TARGET, "unregister");
        let mut k2c = rw_write(&self.key_to_collections, TARGET, "unregister");

        if let Some(collections) = k2c.remove(key) {
            for collection in collections {
                if let Some(keys) = c2k.get_mut(&collection) {
                    keys.remove(key);
                    if keys.is_empty() {
                        c2k.remove(&collection);
                    }
                }
            }
        }
    }
}

impl Default for CollectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_lookup() {
        let registry = CollectionRegistry::new();
        let key = QueryKey::new("blogs").with("home");

        registry.register(key.clone(), [Collection::Blogs]);

        assert!(registry.keys_for(Collection::Blogs).contains(&key));
        assert!(registry.collections_for(&key).contains(&Collection::Blogs));
        assert!(registry.keys_for(Collection::Events).is_empty());
    }

    #[test]
    fn dashboard_key_spans_several_collections() {
        let registry = CollectionRegistry::new();
        let stats = QueryKey::new("dashboard-stats");
        registry.register(
            stats.clone(),
            [Collection::Donations, Collection::Blogs, Collection::Messages],
        );
        registry.register(QueryKey::new("messages"), [Collection::Messages]);

        let keys = registry.keys_for(Collection::Messages);
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&stats));
    }

    #[test]
    fn reregister_drops_stale_collections() {
        let registry = CollectionRegistry::new();
        let key = QueryKey::new("mixed");
        registry.register(key.clone(), [Collection::Blogs, Collection::Events]);
        registry.register(key.clone(), [Collection::Events]);

        assert!(registry.keys_for(Collection::Blogs).is_empty());
        assert!(registry.keys_for(Collection::Events).contains(&key));
    }

    #[test]
    fn unregister_cleans_up_mappings() {
        let registry = CollectionRegistry::new();
        let key = QueryKey::new("donations").with("all");
        registry.register(key.clone(), [Collection::Donations]);
        assert!(!registry.collections_for(&key).is_empty());

        registry.unregister(&key);
        assert!(registry.collections_for(&key).is_empty());
        assert!(registry.keys_for(Collection::Donations).is_empty());
    }
}
