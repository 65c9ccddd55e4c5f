use miette::Diagnostic;
use thiserror::Error;

/// A `Result` typedef to use with the [`CacheError`] type.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced by the output cache's request-processing state machine.
///
/// Per the propagation policy, store and formatter errors (`StoreRead`,
/// `StoreWrite`, `StoreEvict`, `Formatter`) are always logged and swallowed
/// by the middleware so caching never changes the functional behavior of
/// the service; they are surfaced here only so callers composing their own
/// store/formatter can report them upward if desired.
#[derive(Error, Diagnostic, Debug)]
pub enum CacheError {
    /// The store failed on a read; the caller treats this as a miss.
    #[error("cache store read failed for key `{key}`")]
    #[diagnostic(code(http_cache_core::store_read))]
    StoreRead {
        /// The cache key that was being read.
        key: String,
        /// The underlying store error.
        #[source]
        source: anyhow::Error,
    },
    /// The store failed on a write during finalization.
    #[error("cache store write failed for key `{key}`")]
    #[diagnostic(code(http_cache_core::store_write))]
    StoreWrite {
        /// The cache key that was being written.
        key: String,
        /// The underlying store error.
        #[source]
        source: anyhow::Error,
    },
    /// A tag-based eviction failed.
    #[error("cache tag eviction failed for tag `{tag}`")]
    #[diagnostic(code(http_cache_core::store_evict))]
    StoreEvict {
        /// The tag that was being evicted.
        tag: String,
        /// The underlying store error.
        #[source]
        source: anyhow::Error,
    },
    /// A cache entry failed to serialize or deserialize against the store's
    /// byte-blob format.
    #[error("cache entry (de)serialization failed")]
    #[diagnostic(code(http_cache_core::formatter))]
    Formatter(#[from] postcard::Error),
    /// Error converting a header to a string.
    #[error(transparent)]
    #[diagnostic(code(http_cache_core::header_to_str))]
    HeaderToStr(#[from] http::header::ToStrError),
    /// Error parsing an HTTP header value.
    #[error(transparent)]
    #[diagnostic(code(http_cache_core::invalid_header_value))]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
    /// Error parsing an HTTP header name.
    #[error(transparent)]
    #[diagnostic(code(http_cache_core::invalid_header_name))]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    /// Error from the `http` crate's request/response builders.
    #[error(transparent)]
    #[diagnostic(code(http_cache_core::http))]
    Http(#[from] http::Error),
}
