//! Coroutine identity.
//!
//! A `Cid` is a strictly increasing integer assigned at creation and never
//! reused within a scheduler instance, monotonic for the lifetime of the
//! instance. It is generated atomically and bounded by [`MAX_CID`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ceiling of the identity space. Exhausting it refuses further creation.
pub const MAX_CID: u64 = i64::MAX as u64;

/// A unique identifier for a coroutine.
///
/// `Cid` values are strictly increasing within one scheduler instance and
/// are never reused, even after the coroutine they named has closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Cid(pub u64);

impl Cid {
    /// Returns the inner value of the identity.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.0)
    }
}

/// Generator for creating unique coroutine identities.
///
/// The first generated identity is `Cid(1)`; `Cid(0)` is never handed out.
#[derive(Debug)]
pub struct CidGenerator {
    last: AtomicU64,
}

impl CidGenerator {
    /// Create a new identity generator.
    #[inline]
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Generate the next identity, or `None` once the space is exhausted.
    #[inline]
    pub fn generate(&self) -> Option<Cid> {
        let next = self.last.fetch_add(1, Ordering::SeqCst) + 1;
        if next > MAX_CID {
            return None;
        }
        Some(Cid(next))
    }

    /// The last identity handed out, or `None` before the first one.
    #[inline]
    pub fn last(&self) -> Option<Cid> {
        match self.last.load(Ordering::SeqCst) {
            0 => None,
            n => Some(Cid(n.min(MAX_CID))),
        }
    }
}

impl Default for CidGenerator {
    fn default() -> Self {
        Self::new()
    }
}
