//! Configuration surface (spec §6: `MaximumBodySize`,
//! `DefaultExpirationTimeSpan`, `SystemClock`, `BasePolicies`), a plain
//! struct built by the host application rather than loaded from an
//! external config-file format.

use std::{sync::Arc, time::Duration};

use http_cache_core::{shared, CachePolicy, KeyProvider, SharedClock, SystemClock};

/// Options for an [`crate::OutputCacheLayer`].
pub struct OutputCacheOptions {
    /// Ceiling on buffered response-body bytes before buffering disables
    /// itself for the rest of that response (spec §4.3).
    pub maximum_body_size: usize,
    /// Fallback TTL passed to the store when no policy set
    /// `ResponseExpirationTimeSpan` (spec §3, §6).
    pub default_expiration: Duration,
    /// Injected time source (spec §9 "Clock injection").
    pub clock: SharedClock,
    /// Base policy list, run in order before any endpoint-specific
    /// policies a route registers via [`crate::feature::RoutePolicies`]
    /// (spec §4.5 step 1).
    pub base_policies: Vec<Arc<dyn CachePolicy>>,
    /// Derives the storage key from a request (spec §4.2).
    pub key_provider: Arc<dyn KeyProvider>,
}

impl std::fmt::Debug for OutputCacheOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputCacheOptions")
            .field("maximum_body_size", &self.maximum_body_size)
            .field("default_expiration", &self.default_expiration)
            .field("base_policies", &self.base_policies.len())
            .finish()
    }
}

impl Default for OutputCacheOptions {
    fn default() -> Self {
        Self {
            maximum_body_size: 64 * 1024 * 1024,
            default_expiration: Duration::from_secs(60),
            clock: shared(SystemClock),
            base_policies: Vec::new(),
            key_provider: Arc::new(http_cache_core::DefaultKeyProvider),
        }
    }
}

impl OutputCacheOptions {
    /// Starts from [`Self::default`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the buffered-body ceiling.
    pub fn maximum_body_size(mut self, bytes: usize) -> Self {
        self.maximum_body_size = bytes;
        self
    }

    /// Sets the default TTL applied when no policy overrides it.
    pub fn default_expiration(mut self, ttl: Duration) -> Self {
        self.default_expiration = ttl;
        self
    }

    /// Overrides the injected clock, e.g. with a deterministic test double.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Appends a policy to the base list.
    pub fn policy(mut self, policy: impl CachePolicy + 'static) -> Self {
        self.base_policies.push(Arc::new(policy));
        self
    }

    /// Overrides the key provider.
    pub fn key_provider(mut self, provider: impl KeyProvider + 'static) -> Self {
        self.key_provider = Arc::new(provider);
        self
    }
}
