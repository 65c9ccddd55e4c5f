//! Serializes/deserializes a [`CacheEntry`] against an [`OutputCacheStore`].
//!
//! Wire format is `postcard`. The wire format is opaque to the rest of the
//! crate and to the store itself (spec §1: "Serialization format of a cache
//! entry on the wire to the store" is out of scope for everything but this
//! module).

use std::time::Duration;

use log::warn;

use crate::{entry::CacheEntry, error::Result, store::OutputCacheStore};

/// Serializes and deserializes cache entries against a store.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryFormatter;

impl EntryFormatter {
    /// Creates a new formatter. Stateless; provided for symmetry with the
    /// other named components and to leave room for a future wire-format
    /// choice to become a constructor parameter.
    pub fn new() -> Self {
        Self
    }

    /// Fetches and deserializes the entry stored under `key`.
    ///
    /// Store and deserialization failures are logged and treated as a miss,
    /// per the error propagation policy (`StoreReadFailure`): caching must
    /// never change the functional behavior of the service.
    pub async fn get(
        &self,
        key: &str,
        store: &dyn OutputCacheStore,
    ) -> Option<CacheEntry> {
        let bytes = match store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(err) => {
                warn!("cache store read failed for key `{key}`: {err}");
                return None;
            }
        };
        match postcard::from_bytes::<CacheEntry>(&bytes) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!("cache entry deserialization failed for key `{key}`: {err}");
                None
            }
        }
    }

    /// Serializes `entry` and persists it under `key` with the given TTL.
    ///
    /// Store and serialization failures are logged and swallowed
    /// (`StoreWriteFailure`): the response has already been sent to the
    /// client by the time this runs, so a failed write must not surface.
    pub async fn store(
        &self,
        key: &str,
        entry: &CacheEntry,
        ttl: Duration,
        store: &dyn OutputCacheStore,
    ) {
        let bytes = match postcard::to_allocvec(entry) {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("cache entry serialization failed for key `{key}`: {err}");
                return;
            }
        };
        if let Err(err) = store.set(key, bytes, &entry.tags, ttl).await {
            warn!("cache store write failed for key `{key}`: {err}");
        }
    }

    /// Serializes `entry` directly to bytes, bypassing a store. Exposed for
    /// store implementations and tests that need to inspect or round-trip
    /// the wire format without a full `OutputCacheStore`.
    pub fn encode(&self, entry: &CacheEntry) -> Result<Vec<u8>> {
        Ok(postcard::to_allocvec(entry)?)
    }

    /// Deserializes bytes produced by [`Self::encode`].
    pub fn decode(&self, bytes: &[u8]) -> Result<CacheEntry> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::CacheHeaders;
    use std::{
        collections::HashMap,
        sync::Mutex,
        time::SystemTime,
    };

    #[derive(Default)]
    struct MemoryStore(Mutex<HashMap<String, Vec<u8>>>);

    #[async_trait::async_trait]
    impl OutputCacheStore for MemoryStore {
        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.0.lock().unwrap().get(key).cloned())
        }

        async fn set(
            &self,
            key: &str,
            bytes: Vec<u8>,
            _tags: &[String],
            _ttl: Duration,
        ) -> Result<()> {
            self.0.lock().unwrap().insert(key.to_string(), bytes);
            Ok(())
        }

        async fn evict_by_tag(&self, _tag: &str) -> Result<()> {
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.0.lock().unwrap().remove(key);
            Ok(())
        }
    }

    fn sample_entry() -> CacheEntry {
        let mut headers = CacheHeaders::new();
        headers.insert("content-type", "text/plain");
        CacheEntry::new(
            SystemTime::now(),
            200,
            headers,
            b"hello".to_vec(),
            vec!["tag-a".into()],
        )
    }

    #[tokio::test]
    async fn round_trips_through_a_store() {
        let formatter = EntryFormatter::new();
        let store = MemoryStore::default();
        let entry = sample_entry();

        formatter.store("k", &entry, Duration::from_secs(60), &store).await;
        let fetched = formatter.get("k", &store).await.unwrap();

        assert_eq!(fetched.status_code, 200);
        assert_eq!(fetched.body, b"hello");
        assert_eq!(fetched.tags, vec!["tag-a".to_string()]);
    }

    #[tokio::test]
    async fn miss_on_unknown_key() {
        let formatter = EntryFormatter::new();
        let store = MemoryStore::default();
        assert!(formatter.get("missing", &store).await.is_none());
    }

    #[test]
    fn encode_decode_round_trip() {
        let formatter = EntryFormatter::new();
        let entry = sample_entry();
        let bytes = formatter.encode(&entry).unwrap();
        let decoded = formatter.decode(&bytes).unwrap();
        assert_eq!(decoded.body, entry.body);
    }
}
