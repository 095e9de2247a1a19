//! In-memory LOM metadata cache
//!
//! Caches the parsed xattr block per unique object name so hot-path
//! `fill` calls skip the xattr read. Writers update the cache under
//! their exclusive name-lock; the cache itself only needs shard mutexes.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use strata_fs::LmetaBlock;
use xxhash_rust::xxh64::xxh64;

const SHARD_COUNT: usize = 64;

#[derive(Default)]
struct Shard {
    map: Mutex<HashMap<String, Arc<LmetaBlock>>>,
}

pub struct LomCache {
    shards: Vec<Shard>,
}

impl Default for LomCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LomCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Shard::default()).collect(),
        }
    }

    fn shard(&self, uname: &str) -> &Shard {
        &self.shards[xxh64(uname.as_bytes(), 0) as usize % SHARD_COUNT]
    }

    #[must_use]
    pub fn get(&self, uname: &str) -> Option<Arc<LmetaBlock>> {
        self.shard(uname).map.lock().get(uname).cloned()
    }

    pub fn put(&self, uname: &str, block: LmetaBlock) {
        self.shard(uname)
            .map
            .lock()
            .insert(uname.to_string(), Arc::new(block));
    }

    pub fn remove(&self, uname: &str) {
        self.shard(uname).map.lock().remove(uname);
    }

    /// Drop every cached entry of one bucket (bucket destroy/rename).
    pub fn clear_bucket(&self, bck_uname_prefix: &str) {
        for shard in &self.shards {
            shard
                .map
                .lock()
                .retain(|uname, _| !uname.starts_with(bck_uname_prefix));
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.map.lock().len()).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get_remove() {
        let cache = LomCache::new();
        let block = LmetaBlock {
            size: 42,
            ..Default::default()
        };
        cache.put("ais/b/o", block.clone());
        assert_eq!(cache.get("ais/b/o").unwrap().size, 42);
        cache.remove("ais/b/o");
        assert!(cache.get("ais/b/o").is_none());
    }

    #[test]
    fn test_clear_bucket_is_prefix_scoped() {
        let cache = LomCache::new();
        for i in 0..10 {
            cache.put(&format!("ais/b1/o{i}"), LmetaBlock::default());
            cache.put(&format!("ais/b2/o{i}"), LmetaBlock::default());
        }
        cache.clear_bucket("ais/b1/");
        assert_eq!(cache.len(), 10);
        assert!(cache.get("ais/b2/o3").is_some());
        assert!(cache.get("ais/b1/o3").is_none());
    }
}
