//! Async bridge: adapt one-shot external operations into coroutine
//! suspension.
//!
//! A bridged call hands a handler (plus an [`AsyncEvent`] payload and an
//! optional timeout) to the worker-pool collaborator, suspends the calling
//! coroutine, and arranges for it to be resumed once the handler completes
//! or the deadline elapses, whichever comes first. The [`Runtime::run`]
//! entry point starts the engine from outside any coroutine and drives the
//! completion/timeout loop as the outermost driver.

pub mod dispatcher;
pub mod event;

pub use dispatcher::{Completion, Dispatcher, Handler, Job};
pub use event::AsyncEvent;

#[cfg(test)]
mod tests;

use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::coroutine::{Cid, CoroutineError, Scheduler, DEFAULT_STACK_SIZE};

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Default coroutine stack size.
    pub stack_size: usize,
    /// Number of dispatch workers.
    pub dispatch_workers: usize,
    /// Capacity of the dispatch queue; a full queue rejects submissions.
    pub dispatch_queue_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let num_cpus = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            stack_size: DEFAULT_STACK_SIZE,
            dispatch_workers: num_cpus,
            dispatch_queue_size: 1024,
        }
    }
}

#[derive(Debug)]
struct RuntimeInner {
    scheduler: Scheduler,
    dispatcher: Dispatcher,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    /// Active bridge wait per suspended coroutine: cid -> sequence token.
    pending: Mutex<HashMap<Cid, u64>>,
    /// Result slot filled by the driver just before resuming a waiter.
    slots: Mutex<HashMap<Cid, AsyncEvent>>,
    /// Deadlines, earliest first.
    timers: Mutex<BinaryHeap<Reverse<(Instant, u64, Cid)>>>,
    seq: AtomicU64,
}

/// Coroutine engine plus its async collaborators.
///
/// Owns one [`Scheduler`] instance, the dispatch worker pool and the
/// completion/timeout bookkeeping. Cheaply cloneable; the clone passed
/// into the root coroutine body lets it issue bridged calls.
#[derive(Clone, Debug)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a runtime with a custom configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        let scheduler = Scheduler::new();
        scheduler.set_stack_size(config.stack_size);
        let (completion_tx, completion_rx) = unbounded();

        Self {
            inner: Arc::new(RuntimeInner {
                scheduler,
                dispatcher: Dispatcher::new(config.dispatch_workers, config.dispatch_queue_size),
                completion_tx,
                completion_rx,
                pending: Mutex::new(HashMap::new()),
                slots: Mutex::new(HashMap::new()),
                timers: Mutex::new(BinaryHeap::new()),
                seq: AtomicU64::new(1),
            }),
        }
    }

    /// The scheduler instance this runtime drives.
    #[inline]
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Schedule `handler` on the dispatch collaborator, suspend the calling
    /// coroutine, and resume it when the handler completes or `timeout`
    /// elapses, whichever first. On completion the handler's result is
    /// written back through `event`; on timeout `event` is replaced by a
    /// timed-out marker and the late result is discarded.
    ///
    /// Returns `false` without suspending when invoked outside any
    /// coroutine or when the dispatch queue rejects the job (the event is
    /// handed back untouched); `true` once the coroutine has been
    /// suspended and resumed.
    pub fn dispatch<H>(&self, handler: H, event: &mut AsyncEvent, timeout: Option<Duration>) -> bool
    where
        H: FnOnce(&mut AsyncEvent) + Send + 'static,
    {
        let Some(cid) = self.inner.scheduler.current_cid() else {
            return false;
        };

        let seq = self.inner.seq.fetch_add(1, Ordering::SeqCst);
        let job = Job {
            seq,
            cid,
            handler: Box::new(handler),
            event: std::mem::take(event),
            completions: self.inner.completion_tx.clone(),
        };
        match self.inner.dispatcher.try_submit(job) {
            Ok(()) => {}
            Err(rejected) => {
                *event = rejected.event;
                return false;
            }
        }

        self.inner.pending.lock().insert(cid, seq);
        if let Some(timeout) = timeout {
            self.inner
                .timers
                .lock()
                .push(Reverse((Instant::now() + timeout, seq, cid)));
        }

        self.inner.scheduler.yield_current();

        if let Some(resolved) = self.inner.slots.lock().remove(&cid) {
            *event = resolved;
        }
        true
    }

    /// Simplified overload: a zero-argument computation in place of the
    /// (handler, event) pair.
    pub fn dispatch_fn<F>(&self, f: F, timeout: Option<Duration>) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut event = AsyncEvent::new();
        self.dispatch(move |_event| f(), &mut event, timeout)
    }

    /// Start the engine from outside any coroutine: construct and resume a
    /// root coroutine for `f`, then drive completions and timeouts until no
    /// bridged wait remains. Returns the root identity.
    pub fn run<F>(&self, f: F) -> Result<Cid, CoroutineError>
    where
        F: FnOnce(&Runtime) + Send + 'static,
    {
        if self.inner.scheduler.current_cid().is_some() {
            return Err(CoroutineError::InvalidContext);
        }

        let runtime = self.clone();
        let root = self.inner.scheduler.create(move |_sched| f(&runtime))?;
        self.drive();
        Ok(root)
    }

    /// Outermost driver loop: race completions against deadlines and
    /// resume the matching waiter, first come first served.
    fn drive(&self) {
        loop {
            if self.inner.pending.lock().is_empty() {
                break;
            }

            let next_deadline = self
                .inner
                .timers
                .lock()
                .peek()
                .map(|Reverse((at, _, _))| *at);

            let completion = match next_deadline {
                Some(at) => {
                    let now = Instant::now();
                    if at <= now {
                        self.fire_timeouts(now);
                        continue;
                    }
                    match self.inner.completion_rx.recv_timeout(at - now) {
                        Ok(completion) => completion,
                        Err(RecvTimeoutError::Timeout) => {
                            self.fire_timeouts(Instant::now());
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.inner.completion_rx.recv() {
                    Ok(completion) => completion,
                    Err(_) => break,
                },
            };

            let Completion { seq, cid, event } = completion;
            if !self.settle(cid, seq) {
                // Timeout already resumed this waiter; the result is stale.
                tracing::debug!("dropping stale completion for {}", cid);
                continue;
            }
            self.inner.slots.lock().insert(cid, event);
            let _ = self.inner.scheduler.resume(cid);
        }
    }

    /// Resume every waiter whose deadline has passed.
    fn fire_timeouts(&self, now: Instant) {
        let mut expired = Vec::new();
        {
            let mut timers = self.inner.timers.lock();
            while let Some(Reverse((at, seq, cid))) = timers.peek().copied() {
                if at > now {
                    break;
                }
                timers.pop();
                expired.push((seq, cid));
            }
        }

        for (seq, cid) in expired {
            if !self.settle(cid, seq) {
                continue;
            }
            self.inner.slots.lock().insert(cid, AsyncEvent::timeout_marker());
            let _ = self.inner.scheduler.resume(cid);
        }
    }

    /// Claim the pending wait for `cid` if `seq` is still the active token.
    fn settle(&self, cid: Cid, seq: u64) -> bool {
        let mut pending = self.inner.pending.lock();
        if pending.get(&cid) == Some(&seq) {
            pending.remove(&cid);
            true
        } else {
            false
        }
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Construct a default runtime and run `f` as its outermost coroutine.
pub fn run<F>(f: F) -> Result<Cid, CoroutineError>
where
    F: FnOnce(&Runtime) + Send + 'static,
{
    Runtime::new().run(f)
}
