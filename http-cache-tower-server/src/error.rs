//! Errors the middleware itself can surface (spec §7: "configuration/usage
//! errors... and handler-originated errors are surfaced"; everything else
//! — store and policy failures — is swallowed inside `http-cache-core` and
//! never reaches here).

use miette::Diagnostic;
use thiserror::Error;

/// Errors produced by [`crate::OutputCacheService`] itself, as opposed to
/// the store/policy errors `http-cache-core` already swallows with
/// logging.
#[derive(Error, Diagnostic, Debug)]
pub enum MiddlewareError {
    /// A second [`crate::OutputCacheLayer`] tried to install its feature on
    /// a request that already carries one (spec §3 invariant 4, §7
    /// `FeatureAlreadyInstalled`). Stacking two instances of this
    /// middleware on the same request is a configuration mistake, not a
    /// runtime condition to swallow.
    #[error("an output-cache feature is already installed on this request")]
    #[diagnostic(code(http_cache_tower_server::feature_already_installed))]
    FeatureAlreadyInstalled,

    /// The downstream handler (or inner `Service`) returned an error. The
    /// per-request feature and response sink never outlive the `call` that
    /// installed them — they're locals of the same `async` block that
    /// produces this error, so both are gone by the time it propagates
    /// (spec §7 `HandlerFailure`: "propagate upward after restoring the
    /// original response sink and removing the feature; no entry is
    /// stored").
    #[error("downstream handler failed")]
    #[diagnostic(code(http_cache_tower_server::handler_failure))]
    HandlerFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
}
