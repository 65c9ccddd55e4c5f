//! The [`CacheEntry`] data model: an immutable snapshot of a past response.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::headers::CacheHeaders;

/// An immutable snapshot of a past HTTP response, as stored by the cache.
///
/// Invariant: `body.len()` equals the parsed `Content-Length` header when
/// present; otherwise `Transfer-Encoding` was set on capture, in which case
/// no length invariant applies. `headers` never carries an `Age` entry —
/// `Age` is synthesized fresh on every serve from `CachedEntryAge`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// When this entry was captured.
    pub created: SystemTime,
    /// The numeric HTTP status code of the captured response.
    pub status_code: u16,
    /// The captured response headers, excluding `Age`.
    pub headers: CacheHeaders,
    /// The captured response body.
    pub body: Vec<u8>,
    /// Opaque tags used by the store for group invalidation.
    pub tags: Vec<String>,
}

impl CacheEntry {
    /// Builds a new entry, stripping any `Age` header the caller may have
    /// passed in by mistake (spec: "The `Age` header is never stored").
    pub fn new(
        created: SystemTime,
        status_code: u16,
        mut headers: CacheHeaders,
        body: Vec<u8>,
        tags: Vec<String>,
    ) -> Self {
        headers.remove("age");
        Self { created, status_code, headers, body, tags }
    }

    /// The entry's age in whole seconds as of `now`, clamped to zero to
    /// guard against clock skew between capture and serve.
    pub fn age_secs(&self, now: SystemTime) -> u64 {
        now.duration_since(self.created).map(|d| d.as_secs()).unwrap_or(0)
    }
}
