//! The backing byte-blob store, treated as an external collaborator (spec
//! §6: "The backing storage engine... is its concern").

use std::time::Duration;

use crate::error::Result;

/// A byte-blob store keyed by opaque string keys, with tag-indexed group
/// eviction. Values, tags, and TTLs are opaque to the core — this trait is
/// the entire surface the rest of the crate needs from a storage backend.
/// The core owns serialization (see [`crate::formatter::EntryFormatter`])
/// and HTTP semantics; the store owns neither.
#[async_trait::async_trait]
pub trait OutputCacheStore: Send + Sync + 'static {
    /// Fetches the raw bytes for `key`, or `None` on a miss.
    ///
    /// A store-level error is swallowed by the caller (`StoreReadFailure`)
    /// and should be logged by the store implementation before returning
    /// `Ok(None)`, or returned as `Err` to let the caller log it uniformly.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `bytes` under `key`, tagged with `tags`, expiring after `ttl`.
    async fn set(
        &self,
        key: &str,
        bytes: Vec<u8>,
        tags: &[String],
        ttl: Duration,
    ) -> Result<()>;

    /// Evicts every entry tagged with `tag`. Not used by the core directly;
    /// present for completeness of the external interface (spec §6).
    async fn evict_by_tag(&self, tag: &str) -> Result<()>;

    /// Removes a single entry by key. Used for direct invalidation (e.g. a
    /// hosting application invalidating a specific route after a write).
    async fn delete(&self, key: &str) -> Result<()>;
}
