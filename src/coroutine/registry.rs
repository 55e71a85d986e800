//! Live-coroutine registry.
//!
//! Maps identity to coroutine for exactly the set of coroutines that have
//! been constructed and not yet closed. Insertion is atomic with
//! construction, removal with closing; `peak` is a monotone high-water
//! mark of concurrently live coroutines. The registry also carries the
//! diagnostics surface for external tooling: a serializable snapshot, a
//! single-pass enumeration cursor and a log dump.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::cid::Cid;
use super::{Coroutine, State};

/// Side-effect-free description of one live coroutine, for tooling.
#[derive(Debug, Clone, Serialize)]
pub struct CoroutineInfo {
    /// Identity.
    pub cid: Cid,
    /// Lifecycle state at snapshot time.
    pub state: State,
    /// Identity of the most recent resumer, if any.
    pub origin: Option<Cid>,
    /// Milliseconds since construction.
    pub elapsed_msec: u64,
    /// Stack size captured at construction.
    pub stack_size: usize,
}

/// Registry of live coroutines for one scheduler instance.
pub struct Registry {
    inner: Mutex<HashMap<Cid, Arc<Coroutine>>>,
    peak: AtomicUsize,
    /// Pending identities for the enumeration cursor, smallest first.
    cursor: Mutex<Vec<Cid>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("count", &self.count())
            .field("peak", &self.peak_count())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            peak: AtomicUsize::new(0),
            cursor: Mutex::new(Vec::new()),
        }
    }

    /// Insert a freshly constructed coroutine and update the high-water mark.
    pub fn insert(&self, co: Arc<Coroutine>) {
        let mut inner = self.inner.lock();
        inner.insert(co.cid(), co);
        self.peak.fetch_max(inner.len(), Ordering::SeqCst);
    }

    /// Remove a closing coroutine.
    pub fn remove(&self, cid: Cid) -> Option<Arc<Coroutine>> {
        self.inner.lock().remove(&cid)
    }

    /// Look up a live coroutine by identity.
    #[inline]
    pub fn get(&self, cid: Cid) -> Option<Arc<Coroutine>> {
        self.inner.lock().get(&cid).cloned()
    }

    /// Number of live coroutines.
    #[inline]
    pub fn count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Highest number of concurrently live coroutines ever observed.
    #[inline]
    pub fn peak_count(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Snapshot of all live coroutines, ordered by identity.
    pub fn snapshot(&self) -> Vec<Arc<Coroutine>> {
        let mut all: Vec<Arc<Coroutine>> = self.inner.lock().values().cloned().collect();
        all.sort_by_key(|co| co.cid());
        all
    }

    /// Reset the enumeration cursor to the current live set.
    pub fn iter_reset(&self) {
        let mut cids: Vec<Cid> = self.inner.lock().keys().copied().collect();
        // Pop from the back, so store largest-first.
        cids.sort_unstable_by(|a, b| b.cmp(a));
        *self.cursor.lock() = cids;
    }

    /// Next live coroutine under the cursor. Identities that closed since
    /// the last reset are skipped. Stable for a single enumeration pass.
    pub fn iter_next(&self) -> Option<Arc<Coroutine>> {
        loop {
            let cid = self.cursor.lock().pop()?;
            if let Some(co) = self.get(cid) {
                return Some(co);
            }
        }
    }

    /// Tooling snapshot of every live coroutine.
    pub fn infos(&self) -> Vec<CoroutineInfo> {
        self.snapshot()
            .iter()
            .map(|co| CoroutineInfo {
                cid: co.cid(),
                state: co.state(),
                origin: co.origin_cid(),
                elapsed_msec: co.elapsed_msec(),
                stack_size: co.stack_size(),
            })
            .collect()
    }

    /// Dump the live set through the logger.
    pub fn print_list(&self) {
        for info in self.infos() {
            tracing::info!(
                "coroutine {} state={:?} origin={:?} elapsed={}ms stack={}",
                info.cid,
                info.state,
                info.origin,
                info.elapsed_msec,
                info.stack_size
            );
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
