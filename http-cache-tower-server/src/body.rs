//! The single outbound body type this crate's `Service` impl returns,
//! regardless of which of the three request-processing outcomes (spec §2)
//! produced it.

use bytes::Bytes;
use http_body::Body;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};

/// A type-erased error, the error type every body variant converges to.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The response body type returned by [`crate::OutputCacheService`]:
/// either a fully-buffered cache hit/execute result, or the inner
/// service's own body, forwarded untouched on the pass-through path.
pub type CacheBody = BoxBody<Bytes, BoxError>;

/// Wraps a complete, already-buffered body (a cache hit, a 304, a 504, or a
/// just-executed-and-captured response).
pub fn full_body(bytes: impl Into<Bytes>) -> CacheBody {
    Full::new(bytes.into()).map_err(|err: std::convert::Infallible| match err {}).boxed()
}

/// A body with no content (used for the 304 and 504 cases).
pub fn empty_body() -> CacheBody {
    Empty::new().map_err(|err: std::convert::Infallible| match err {}).boxed()
}

/// Boxes an inner service's own body for the pass-through path, where this
/// middleware does no interception at all.
pub fn passthrough_body<B>(body: B) -> CacheBody
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed()
}
