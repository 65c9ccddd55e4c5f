//! The per-request feature slot (spec §4.5 step 2, §9 "feature slot
//! coupling"): a typed `http::Extensions` entry standing in for the host
//! pipeline's ambient per-request state, with the single-installation
//! invariant (spec §3 invariant 4) enforced at install time.

use std::sync::Arc;

use http_cache_core::{CachePolicy, RequestContext};
use tokio::sync::Mutex;

/// The installed marker: an `Arc<Mutex<_>>` rather than a bare
/// `RequestContext` because the execute-and-store path hands a clone of
/// this handle into a detached dispatcher task (spec §4.1: the shared
/// factory runs independent of any one caller's lifetime).
#[derive(Clone)]
pub(crate) struct OutputCacheFeature(pub(crate) Arc<Mutex<RequestContext>>);

impl OutputCacheFeature {
    pub(crate) fn new() -> Self {
        Self(Arc::new(Mutex::new(RequestContext::new())))
    }
}

/// Per-route policies, registered via `tower::ServiceBuilder`'s
/// `Extension`-style layering (or directly into `req.extensions_mut()`) to
/// extend the layer's base policy list for a specific route (spec §4.5
/// step 1: "a base list from configuration, plus endpoint-attached
/// metadata... order is base-first, then metadata").
#[derive(Clone, Default)]
pub struct RoutePolicies(pub Vec<Arc<dyn CachePolicy>>);

impl RoutePolicies {
    /// Wraps a single additional policy, for the common case of one
    /// route-specific override.
    pub fn single(policy: Arc<dyn CachePolicy>) -> Self {
        Self(vec![policy])
    }
}
