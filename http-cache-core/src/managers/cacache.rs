//! A disk-backed [`OutputCacheStore`] using [`cacache`](https://github.com/zkat/cacache-rs).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};

use crate::error::{CacheError, Result};
use crate::store::OutputCacheStore;

#[derive(Serialize, Deserialize)]
struct Envelope {
    expires_at: SystemTime,
    bytes: Vec<u8>,
}

/// A disk-backed [`OutputCacheStore`] rooted at a single directory.
///
/// Tag membership is tracked in an in-memory index, not on disk: it does
/// not survive a process restart, so [`evict_by_tag`](OutputCacheStore::evict_by_tag)
/// only ever sees tags assigned since the store was constructed.
#[derive(Debug, Clone)]
pub struct CacacheStore {
    path: PathBuf,
    tags: Arc<DashMap<String, DashSet<String>>>,
}

impl CacacheStore {
    /// Creates a store rooted at `path`. The directory is created lazily on
    /// first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), tags: Arc::new(DashMap::new()) }
    }

    fn record_tags(&self, key: &str, tags: &[String]) {
        for tag in tags {
            self.tags.entry(tag.clone()).or_default().insert(key.to_string());
        }
    }
}

#[async_trait::async_trait]
impl OutputCacheStore for CacacheStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let raw = match cacache::read(&self.path, key).await {
            Ok(raw) => raw,
            Err(cacache::Error::EntryNotFound(_, _)) => return Ok(None),
            Err(err) => {
                return Err(CacheError::StoreRead {
                    key: key.to_string(),
                    source: err.into(),
                })
            }
        };
        let envelope: Envelope = postcard::from_bytes(&raw)
            .map_err(|err| CacheError::StoreRead { key: key.to_string(), source: err.into() })?;
        if envelope.expires_at <= SystemTime::now() {
            let _ = cacache::remove(&self.path, key).await;
            return Ok(None);
        }
        Ok(Some(envelope.bytes))
    }

    async fn set(&self, key: &str, bytes: Vec<u8>, tags: &[String], ttl: Duration) -> Result<()> {
        let envelope = Envelope { expires_at: SystemTime::now() + ttl, bytes };
        let encoded = postcard::to_allocvec(&envelope)
            .map_err(|err| CacheError::StoreWrite { key: key.to_string(), source: err.into() })?;
        cacache::write(&self.path, key, encoded)
            .await
            .map_err(|err| CacheError::StoreWrite { key: key.to_string(), source: err.into() })?;
        self.record_tags(key, tags);
        Ok(())
    }

    async fn evict_by_tag(&self, tag: &str) -> Result<()> {
        let Some((_, keys)) = self.tags.remove(tag) else {
            return Ok(());
        };
        for key in keys {
            cacache::remove(&self.path, &key).await.map_err(|err| CacheError::StoreEvict {
                tag: tag.to_string(),
                source: err.into(),
            })?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        cacache::remove(&self.path, key)
            .await
            .map_err(|err| CacheError::StoreWrite { key: key.to_string(), source: err.into() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> CacacheStore {
        CacacheStore::new(tempfile::tempdir().unwrap().into_path())
    }

    #[tokio::test]
    async fn round_trips_a_value() {
        let store = store();
        store.set("k", b"hello".to_vec(), &[], Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn miss_on_unknown_key() {
        let store = store();
        assert_eq!(store.get("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn expired_entries_read_as_a_miss() {
        let store = store();
        store.set("k", b"hello".to_vec(), &[], Duration::from_secs(0)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn evict_by_tag_removes_all_tagged_keys() {
        let store = store();
        let tag = vec!["group-a".to_string()];
        store.set("k1", b"a".to_vec(), &tag, Duration::from_secs(60)).await.unwrap();
        store.set("k2", b"b".to_vec(), &tag, Duration::from_secs(60)).await.unwrap();
        store.set("k3", b"c".to_vec(), &[], Duration::from_secs(60)).await.unwrap();

        store.evict_by_tag("group-a").await.unwrap();

        assert_eq!(store.get("k1").await.unwrap(), None);
        assert_eq!(store.get("k2").await.unwrap(), None);
        assert_eq!(store.get("k3").await.unwrap(), Some(b"c".to_vec()));
    }

    #[tokio::test]
    async fn delete_removes_a_single_key() {
        let store = store();
        store.set("k", b"hello".to_vec(), &[], Duration::from_secs(60)).await.unwrap();
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
    }
}
