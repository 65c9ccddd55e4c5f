//! Clock injection (spec §9: "`SystemClock` is pluggable for determinism in
//! tests. Treat as a capability passed to the middleware constructor.").

use std::{
    sync::Arc,
    time::SystemTime,
};

/// A source of the current time, injected into the middleware so tests can
/// control `ResponseTime` / `CachedEntryAge` without sleeping.
pub trait Clock: Send + Sync + 'static {
    /// Returns the current wall-clock time.
    fn now(&self) -> SystemTime;
}

/// The production clock: `SystemTime::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A shared, type-erased clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Wraps a [`Clock`] implementation in a [`SharedClock`].
pub fn shared(clock: impl Clock) -> SharedClock {
    Arc::new(clock)
}

/// Formats `time` as an RFC 7231 HTTP-date, the representation the `Date`
/// header requires. Used at finalize time to stamp the outbound `Date`
/// header with `ResponseTime` (spec §4.5 "FinalizeHeaders: ... set outbound
/// `Date` to `ResponseTime`").
pub fn http_date(time: SystemTime) -> String {
    httpdate::fmt_http_date(time)
}

#[cfg(test)]
pub use test_support::FixedClock;
