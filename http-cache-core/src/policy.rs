//! Per-request coordination state and the policy hook interface (spec §3,
//! §6). Policy objects are supplied by the host application; the core only
//! invokes their hooks in order, at three fixed points in the lifecycle.

use std::{
    collections::HashSet,
    time::{Duration, SystemTime},
};

use crate::{entry::CacheEntry, key::VaryBy};

/// Per-request mutable coordination record, created on entry and discarded
/// at the end of the request (spec §3: "RequestContext").
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Master switch; if false the middleware does not intercept at all.
    pub enable_output_caching: bool,
    /// Whether a cache lookup may be attempted for this request.
    pub allow_cache_lookup: bool,
    /// Whether a captured response may be persisted for this request.
    pub allow_cache_storage: bool,
    /// Whether the execute-and-store path may coalesce via the dispatcher.
    pub allow_locking: bool,
    /// Opaque labels accumulated during policy evaluation, attached to any
    /// entry stored for this request.
    pub tags: HashSet<String>,
    /// Request attributes policies have asked the key provider to fold in.
    pub vary_by: VaryBy,
    /// Policy-supplied TTL override; falls back to a configured default.
    pub response_expiration: Option<Duration>,
    /// Set by `ServeCached` when evaluating a hit.
    pub response_time: Option<SystemTime>,
    /// Set by `ServeCached` when evaluating a hit.
    pub cached_entry_age: Option<Duration>,
    /// Whether the candidate entry is still considered usable; policies may
    /// flip this to `false` in their `ServeFromCache` hook.
    pub is_cache_entry_fresh: bool,
    /// The entry being served, if this request is on a hit path.
    pub cached_response: Option<CacheEntry>,

    cache_key: Option<String>,
    response_started: bool,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            enable_output_caching: true,
            allow_cache_lookup: true,
            allow_cache_storage: true,
            allow_locking: true,
            tags: HashSet::new(),
            vary_by: VaryBy::none(),
            response_expiration: None,
            response_time: None,
            cached_entry_age: None,
            is_cache_entry_fresh: true,
            cached_response: None,
            cache_key: None,
            response_started: false,
        }
    }
}

impl RequestContext {
    /// Creates a context with all allow-flags enabled, as a freshly arrived
    /// request has them before any policy runs.
    pub fn new() -> Self {
        Self::default()
    }

    /// The memoized cache key, if computed yet (spec invariant: "`CacheKey`
    /// is set before any store read or write").
    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    /// Returns the existing memoized key, or computes, memoizes, and
    /// returns a new one via `compute`. `compute` is not called if a key is
    /// already memoized.
    pub fn cache_key_or_compute(&mut self, compute: impl FnOnce() -> String) -> &str {
        if self.cache_key.is_none() {
            self.cache_key = Some(compute());
        }
        self.cache_key.as_deref().expect("just set above")
    }

    /// Whether the response has already started (headers frozen, first byte
    /// written or handler returned without writing).
    pub fn response_started(&self) -> bool {
        self.response_started
    }

    /// Latches `response_started` to `true`. Returns whether this call
    /// performed the false→true transition (spec invariant 2: "transitions
    /// false→true at most once per request").
    pub fn mark_response_started(&mut self) -> bool {
        if self.response_started {
            false
        } else {
            self.response_started = true;
            true
        }
    }
}

/// A hook invoked by the middleware core at three fixed points in a
/// request's lifecycle. Default (no-op) bodies let a policy override only
/// the hooks it cares about.
#[async_trait::async_trait]
pub trait CachePolicy: Send + Sync {
    /// Runs before any cache lookup. May toggle the allow-flags, add tags,
    /// set an expiration override, and extend `vary_by`.
    async fn cache_request(&self, ctx: &mut RequestContext) {
        let _ = ctx;
    }

    /// Runs once a candidate entry has been found and its age computed. May
    /// flip `is_cache_entry_fresh` to `false` to reject an otherwise-usable
    /// hit (e.g. an application-defined freshness rule beyond plain TTL).
    async fn serve_from_cache(&self, ctx: &mut RequestContext) {
        let _ = ctx;
    }

    /// Runs after the downstream handler has produced a response and its
    /// headers are known. May revoke `allow_cache_storage`.
    async fn serve_response(&self, ctx: &mut RequestContext) {
        let _ = ctx;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_everything() {
        let ctx = RequestContext::new();
        assert!(ctx.enable_output_caching);
        assert!(ctx.allow_cache_lookup);
        assert!(ctx.allow_cache_storage);
        assert!(ctx.allow_locking);
        assert!(ctx.cache_key().is_none());
    }

    #[test]
    fn response_started_latches_exactly_once() {
        let mut ctx = RequestContext::new();
        assert!(ctx.mark_response_started());
        assert!(!ctx.mark_response_started());
        assert!(ctx.response_started());
    }

    #[test]
    fn cache_key_is_memoized() {
        let mut ctx = RequestContext::new();
        let mut calls = 0;
        ctx.cache_key_or_compute(|| {
            calls += 1;
            "k1".to_string()
        });
        ctx.cache_key_or_compute(|| {
            calls += 1;
            "k2".to_string()
        });
        assert_eq!(ctx.cache_key(), Some("k1"));
        assert_eq!(calls, 1);
    }

    struct DisablesStorage;

    #[async_trait::async_trait]
    impl CachePolicy for DisablesStorage {
        async fn cache_request(&self, ctx: &mut RequestContext) {
            ctx.allow_cache_storage = false;
        }
    }

    #[tokio::test]
    async fn a_policy_can_override_a_single_hook() {
        let mut ctx = RequestContext::new();
        let policy = DisablesStorage;
        policy.cache_request(&mut ctx).await;
        policy.serve_from_cache(&mut ctx).await;
        assert!(!ctx.allow_cache_storage);
        assert!(ctx.is_cache_entry_fresh);
    }
}
