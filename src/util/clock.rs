//! Monotonic millisecond clock.
//!
//! The engine timestamps every coroutine at construction and answers
//! elapsed-time queries against the same clock. Wall time is deliberately
//! not used: the clock must never go backwards.

use once_cell::sync::Lazy;
use std::time::Instant;

/// Process-start epoch for all monotonic timestamps.
static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Milliseconds elapsed since the process-start epoch.
#[inline]
pub fn now_msec() -> u64 {
    EPOCH.elapsed().as_millis() as u64
}

/// Force epoch initialization (useful before the first timing-sensitive call).
#[inline]
pub fn touch() {
    Lazy::force(&EPOCH);
}
