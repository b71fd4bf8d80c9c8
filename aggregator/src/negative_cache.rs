// Short lived cache of account lookups that upstream reported as not found, so
// repeated searches for a missing name do not spend upstream quota.
use crate::counter;
use crate::metrics_defs::{NEGATIVE_CACHE_HIT, NEGATIVE_CACHE_MISS};
use moka::sync::Cache;
use std::time::Duration;

const SIZE: u64 = 10_000;

pub struct NegativeCache {
    cache: Cache<String, ()>,
}

impl NegativeCache {
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(SIZE)
            .time_to_live(ttl)
            .build();

        NegativeCache { cache }
    }

    pub fn insert(&self, name: &str, tag: &str) {
        self.cache.insert(key(name, tag), ());
    }

    pub fn contains(&self, name: &str, tag: &str) -> bool {
        let cache_hit = self.cache.contains_key(&key(name, tag));
        let metric_def = if cache_hit {
            NEGATIVE_CACHE_HIT
        } else {
            NEGATIVE_CACHE_MISS
        };
        counter!(metric_def).increment(1);
        cache_hit
    }

    pub fn remove(&self, name: &str, tag: &str) {
        self.cache.invalidate(&key(name, tag));
    }
}

// Names and tags are matched case-insensitively everywhere else.
fn key(name: &str, tag: &str) -> String {
    format!("{}#{}", name.to_lowercase(), tag.to_lowercase())
}
