#![cfg_attr(docsrs, feature(doc_cfg))]
//! A server-side HTTP output cache.
//!
//! This crate is a thin facade over two workspace members: a small root
//! crate that re-exports a core plus an optional framework integration
//! behind a Cargo feature:
//!
//! - [`http_cache_core`], re-exported here in full, is the
//!   request-processing state machine: per-key singleflight coalescing,
//!   cache-key derivation, the `CacheEntry`/`RequestContext` data model,
//!   conditional-request evaluation, and the `OutputCacheStore` /
//!   `CachePolicy` external interfaces, plus the `cacache`- and
//!   `moka`-backed store implementations (gated behind the `manager-cacache`
//!   and `manager-moka` features, mirroring this crate's own).
//! - `http_cache_tower_server`, re-exported as [`tower`] behind the `tower`
//!   feature (on by default), wires that core into a `tower::Layer` /
//!   `tower::Service` for Axum/Tower-based applications.
//!
//! Depend on this crate directly for the common case of caching behind a
//! Tower stack; depend on `http-cache-core` directly to build an
//! integration for a different host framework.

pub use http_cache_core::*;

#[cfg(feature = "tower")]
#[cfg_attr(docsrs, doc(cfg(feature = "tower")))]
pub use http_cache_tower_server as tower;
