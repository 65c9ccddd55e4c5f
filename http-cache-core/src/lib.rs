#![forbid(unsafe_code, future_incompatible)]
#![deny(
    missing_docs,
    missing_debug_implementations,
    nonstandard_style,
    unused_qualifications,
    unused_import_braces,
    unused_extern_crates,
    trivial_casts,
    trivial_numeric_casts
)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! The request-processing state machine for a server-side HTTP output
//! cache: per-key singleflight coalescing, cache-key derivation, conditional
//! (`If-None-Match` / `If-Modified-Since`) evaluation, and the
//! `CacheEntry` / `RequestContext` data model that the output cache is
//! built from.
//!
//! This crate deliberately does not own:
//!
//! - The backing byte-blob store ([`OutputCacheStore`]) — two concrete
//!   backends are provided behind Cargo features (`manager-cacache`,
//!   `manager-moka`).
//! - The policy objects that decide *whether* and *how long* to cache
//!   ([`CachePolicy`]) — supplied by the host application.
//! - Response-body interception and buffering, and the HTTP wiring itself
//!   (Tower `Layer`/`Service`, feature installation, 304/504 assembly) —
//!   that lives in the companion `http-cache-tower-server` crate.
//!
//! ## Components
//!
//! - [`dispatcher::WorkDispatcher`] — per-key singleflight coalescing.
//! - [`key::KeyProvider`] — cache-key derivation from a request.
//! - [`entry::CacheEntry`] — the immutable snapshot of a past response.
//! - [`policy::RequestContext`] / [`policy::CachePolicy`] — per-request
//!   coordination state and the three policy hooks.
//! - [`conditional::ConditionalEvaluator`] — `If-None-Match` /
//!   `If-Modified-Since` → 304 decisions.
//! - [`formatter::EntryFormatter`] — serializes a [`entry::CacheEntry`]
//!   against an [`store::OutputCacheStore`].
//! - [`clock::Clock`] — injected time source, for deterministic tests.
//!
//! ## Features
//!
//! - `manager-cacache` (default): a disk-backed [`store::OutputCacheStore`]
//!   using [cacache](https://github.com/zkat/cacache-rs).
//! - `manager-moka`: an in-memory [`store::OutputCacheStore`] using
//!   [moka](https://github.com/moka-rs/moka), with per-entry TTL.

pub mod clock;
pub mod conditional;
pub mod dispatcher;
pub mod entry;
pub mod error;
pub mod formatter;
pub mod headers;
pub mod key;
mod managers;
pub mod policy;
pub mod store;

pub use clock::{http_date, shared, Clock, SharedClock, SystemClock};
pub use conditional::{ConditionalEvaluator, NOT_MODIFIED_HEADERS};
pub use dispatcher::{Provenance, WorkDispatcher};
pub use entry::CacheEntry;
pub use error::{CacheError, Result};
pub use formatter::EntryFormatter;
pub use headers::CacheHeaders;
pub use key::{DefaultKeyProvider, KeyProvider, QueryKeyProvider, VaryBy};
pub use policy::{CachePolicy, RequestContext};
pub use store::OutputCacheStore;

#[cfg(feature = "manager-cacache")]
#[cfg_attr(docsrs, doc(cfg(feature = "manager-cacache")))]
pub use managers::cacache::CacacheStore;

#[cfg(feature = "manager-moka")]
#[cfg_attr(docsrs, doc(cfg(feature = "manager-moka")))]
pub use managers::moka::MokaStore;
