//! An in-memory [`OutputCacheStore`] using [`moka`](https://github.com/moka-rs/moka).

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::{DashMap, DashSet};
use moka::future::Cache;
use moka::Expiry;

use crate::error::Result;
use crate::store::OutputCacheStore;

#[derive(Clone)]
struct Entry {
    bytes: Arc<Vec<u8>>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// An in-memory [`OutputCacheStore`] with a bounded capacity and per-entry TTL.
#[derive(Clone)]
pub struct MokaStore {
    cache: Cache<String, Entry>,
    tags: Arc<DashMap<String, DashSet<String>>>,
}

impl fmt::Debug for MokaStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MokaStore").field("entry_count", &self.cache.entry_count()).finish()
    }
}

impl MokaStore {
    /// Creates a store holding at most `max_capacity` entries. Each entry
    /// expires according to the `ttl` passed to its own `set` call, not a
    /// cache-wide TTL.
    pub fn new(max_capacity: u64) -> Self {
        let cache =
            Cache::builder().max_capacity(max_capacity).expire_after(PerEntryTtl).build();
        Self { cache, tags: Arc::new(DashMap::new()) }
    }
}

#[async_trait::async_trait]
impl OutputCacheStore for MokaStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.cache.get(key).await.map(|entry| entry.bytes.as_ref().clone()))
    }

    async fn set(&self, key: &str, bytes: Vec<u8>, tags: &[String], ttl: Duration) -> Result<()> {
        self.cache.insert(key.to_string(), Entry { bytes: Arc::new(bytes), ttl }).await;
        for tag in tags {
            self.tags.entry(tag.clone()).or_default().insert(key.to_string());
        }
        Ok(())
    }

    async fn evict_by_tag(&self, tag: &str) -> Result<()> {
        let Some((_, keys)) = self.tags.remove(tag) else {
            return Ok(());
        };
        for key in keys {
            self.cache.invalidate(&key).await;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}
