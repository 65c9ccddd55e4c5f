#![cfg_attr(docsrs, feature(doc_cfg))]
//! Tower middleware wiring [`http_cache_core`] into a request-processing
//! pipeline: feature installation, coalesced lookup and execution, the
//! conditional (`If-None-Match` / `If-Modified-Since`) and `only-if-cached`
//! request paths, and response finalization.
//!
//! The control flow lives in [`OutputCacheLayer`] / [`OutputCacheService`];
//! everything else in this crate is a supporting piece it composes:
//!
//! - [`OutputCacheOptions`] — the host-supplied configuration surface
//!   (buffered-body ceiling, default expiration, clock, base policies, key
//!   provider).
//! - [`stream::OutputCacheStream`] — the write-through response-body
//!   buffering wrapper.
//! - [`feature::RoutePolicies`] — per-route policy attachment via
//!   `http::Extensions`.
//! - [`error::MiddlewareError`] — errors this crate itself can surface, as
//!   opposed to the store/policy errors `http-cache-core` already swallows.
//!
//! ```rust,no_run
//! use http_cache_core::{CachePolicy, CacacheStore};
//! use http_cache_tower_server::{OutputCacheLayer, OutputCacheOptions};
//! use tower::ServiceBuilder;
//!
//! # struct CacheGetRequests;
//! # #[async_trait::async_trait]
//! # impl CachePolicy for CacheGetRequests {
//! #     async fn cache_request(&self, ctx: &mut http_cache_core::RequestContext) {
//! #         ctx.allow_cache_storage = true;
//! #     }
//! # }
//! let store = CacacheStore::new("/tmp/output-cache");
//! let options = OutputCacheOptions::new().policy(CacheGetRequests);
//! let layer = OutputCacheLayer::new(store, options);
//! let _ = ServiceBuilder::new().layer(layer);
//! ```

mod body;
mod error;
mod feature;
mod options;
mod service;
mod stream;

pub use body::{BoxError, CacheBody};
pub use error::MiddlewareError;
pub use feature::RoutePolicies;
pub use options::OutputCacheOptions;
pub use service::{OutputCacheLayer, OutputCacheService};
pub use stream::OutputCacheStream;
