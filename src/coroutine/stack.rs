//! Stack-size policy for new coroutines.
//!
//! The engine-wide default is configurable at runtime; every request is
//! clamped to `[MIN_STACK_SIZE, MAX_STACK_SIZE]` and rounded up to
//! `STACK_ALIGN`. A coroutine captures the policy value at construction,
//! so later changes never affect live coroutines.

/// Alignment granularity for stack sizes (4 KiB).
pub const STACK_ALIGN: usize = 4 * 1024;

/// Smallest stack a coroutine may receive (64 KiB).
pub const MIN_STACK_SIZE: usize = 64 * 1024;

/// Largest stack a coroutine may receive (16 MiB).
pub const MAX_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Default stack size for new coroutines (2 MiB).
pub const DEFAULT_STACK_SIZE: usize = 2 * 1024 * 1024;

/// Clamp a requested stack size to the legal range and round it up to the
/// alignment granularity. The returned value, not the raw request, is what
/// new coroutines receive.
#[inline]
pub fn aligned_stack_size(requested: usize) -> usize {
    let clamped = requested.clamp(MIN_STACK_SIZE, MAX_STACK_SIZE);
    // MAX_STACK_SIZE is itself aligned, so the round-up cannot overflow it.
    (clamped + STACK_ALIGN - 1) & !(STACK_ALIGN - 1)
}
