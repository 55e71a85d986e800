//! Stackful cooperative coroutine core.
//!
//! This module provides the coroutine object model and its lifecycle
//! protocol: creation, resume/yield transfer of control, the
//! Init/Waiting/Running/Ended state machine, the live-coroutine registry,
//! the stack-size policy, cross-cutting swap hooks and the fatal bailout
//! path.
//!
//! # Architecture
//!
//! - [`Cid`](cid::Cid) - Unique identity for a coroutine
//! - [`Coroutine`] - The unit of scheduling: identity, state, one stack
//! - [`Scheduler`] - Explicit per-thread engine instance owning `current`,
//!   the registry, counters and hook slots
//! - [`StackContext`](context::StackContext) - The audited control-transfer seam
//! - [`Registry`](registry::Registry) - Live map plus diagnostics surface
//!
//! Scheduling is single-threaded cooperative: within one [`Scheduler`]
//! instance exactly one coroutine (or the outer driver) holds the thread of
//! control, and switches happen only at explicit suspension points.
//! Parallel instances, one per worker thread, share nothing.

pub mod cid;
pub mod context;
pub mod hooks;
pub mod registry;
pub mod stack;

pub use cid::{Cid, CidGenerator, MAX_CID};
pub use hooks::{BailoutHook, FatalHook, SwapHook};
pub use registry::{CoroutineInfo, Registry};
pub use stack::{
    aligned_stack_size, DEFAULT_STACK_SIZE, MAX_STACK_SIZE, MIN_STACK_SIZE, STACK_ALIGN,
};

#[cfg(test)]
mod tests;

use parking_lot::Mutex;
use serde::Serialize;
use std::any::Any;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;

use crate::util::clock;
use context::StackContext;
use hooks::HookSlots;

/// Errors reported by engine operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineError {
    /// The target identity names a closed (or never-existing) coroutine.
    /// Not an abnormal condition: Ended is the normal terminal state.
    #[error("coroutine has already ended")]
    Ended,
    /// Creation refused: the identity space or a resource ceiling would be
    /// exceeded.
    #[error("coroutine limit exceeded")]
    LimitExceeded,
    /// The operation requires a different coroutine context than the one
    /// it was invoked in.
    #[error("operation invoked in an invalid coroutine context")]
    InvalidContext,
}

/// Coroutine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum State {
    /// Constructed, never resumed.
    Init,
    /// Suspended at a yield point.
    Waiting,
    /// Currently holding the thread of control.
    Running,
    /// Body returned; terminal.
    Ended,
}

impl State {
    /// Convert from u8 (for atomic storage).
    #[inline]
    pub fn from_u8(val: u8) -> Self {
        match val {
            0 => State::Init,
            1 => State::Waiting,
            2 => State::Running,
            _ => State::Ended,
        }
    }

    /// Convert to u8 (for atomic storage).
    #[inline]
    pub fn as_u8(&self) -> u8 {
        match self {
            State::Init => 0,
            State::Waiting => 1,
            State::Running => 2,
            State::Ended => 3,
        }
    }
}

/// Caller-supplied payload carried alongside a coroutine. The engine never
/// interprets it.
pub type Task = Arc<dyn Any + Send + Sync>;

/// The unit of cooperative scheduling: identity, lifecycle state, an
/// opaque task payload and exclusive ownership of one stack context.
pub struct Coroutine {
    cid: Cid,
    state: AtomicU8,
    /// Most recent resumer; overwritten on every resume, meaningful only
    /// while this coroutine is the executing one.
    origin: Mutex<Option<Cid>>,
    task: Mutex<Option<Task>>,
    created_msec: u64,
    stack_size: usize,
    context: StackContext,
}

impl std::fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coroutine")
            .field("cid", &self.cid)
            .field("state", &self.state())
            .field("origin", &self.origin_cid())
            .field("stack_size", &self.stack_size)
            .finish()
    }
}

impl Coroutine {
    /// Get the identity.
    #[inline]
    pub fn cid(&self) -> Cid {
        self.cid
    }

    /// Get the current lifecycle state.
    #[inline]
    pub fn state(&self) -> State {
        State::from_u8(self.state.load(Ordering::SeqCst))
    }

    #[inline]
    fn set_state(&self, state: State) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    /// Identity of the coroutine (or outer driver: `None`) that most
    /// recently resumed this one.
    #[inline]
    pub fn origin_cid(&self) -> Option<Cid> {
        *self.origin.lock()
    }

    #[inline]
    fn set_origin(&self, origin: Option<Cid>) {
        *self.origin.lock() = origin;
    }

    /// Get the caller-owned task payload.
    #[inline]
    pub fn task(&self) -> Option<Task> {
        self.task.lock().clone()
    }

    /// Attach a caller-owned task payload, replacing any previous one.
    #[inline]
    pub fn set_task(&self, task: Task) {
        *self.task.lock() = Some(task);
    }

    /// Monotonic timestamp captured at construction, in milliseconds.
    #[inline]
    pub fn created_msec(&self) -> u64 {
        self.created_msec
    }

    /// Milliseconds this coroutine has existed.
    #[inline]
    pub fn elapsed_msec(&self) -> u64 {
        clock::now_msec().saturating_sub(self.created_msec)
    }

    /// Stack size captured at construction.
    #[inline]
    pub fn stack_size(&self) -> usize {
        self.stack_size
    }

    /// Whether the body has returned.
    #[inline]
    pub fn is_ended(&self) -> bool {
        self.state() == State::Ended
    }

    #[inline]
    fn context(&self) -> &StackContext {
        &self.context
    }
}

#[derive(Debug)]
struct SchedulerInner {
    /// Identity of the coroutine presently executing, or `None` when the
    /// outermost driver holds the thread of control.
    current: Mutex<Option<Cid>>,
    registry: Registry,
    cids: CidGenerator,
    /// Clamped-and-aligned default stack size for new coroutines.
    stack_size: AtomicUsize,
    hooks: HookSlots,
}

/// A coroutine scheduler instance.
///
/// All formerly ambient engine state — `current`, the registry, the
/// identity counter, the stack policy and the hook slots — lives on an
/// explicit instance. The handle is cheaply cloneable and is passed into
/// every coroutine body; instances on different threads share nothing.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("current", &self.current_cid())
            .field("count", &self.count())
            .finish()
    }
}

impl Scheduler {
    /// Create a scheduler with the default stack policy.
    pub fn new() -> Self {
        clock::touch();
        Self {
            inner: Arc::new(SchedulerInner {
                current: Mutex::new(None),
                registry: Registry::new(),
                cids: CidGenerator::new(),
                stack_size: AtomicUsize::new(DEFAULT_STACK_SIZE),
                hooks: HookSlots::new(),
            }),
        }
    }

    // ---- creation and control transfer ----------------------------------

    /// Construct a coroutine for `f` and immediately perform its first
    /// resume. Returns the new identity once the coroutine has yielded or
    /// ended.
    pub fn create<F>(&self, f: F) -> Result<Cid, CoroutineError>
    where
        F: FnOnce(&Scheduler) + Send + 'static,
    {
        let cid = self
            .inner
            .cids
            .generate()
            .ok_or(CoroutineError::LimitExceeded)?;
        let stack_size = self.stack_size();

        let sched = self.clone();
        let context = StackContext::new(
            stack_size,
            &format!("xiecheng-co-{}", cid.value()),
            move || f(&sched),
        )
        .map_err(|e| {
            tracing::error!("failed to allocate coroutine stack: {e}");
            CoroutineError::LimitExceeded
        })?;

        let co = Arc::new(Coroutine {
            cid,
            state: AtomicU8::new(State::Init.as_u8()),
            origin: Mutex::new(None),
            task: Mutex::new(None),
            created_msec: clock::now_msec(),
            stack_size,
            context,
        });
        self.inner.registry.insert(co.clone());

        self.resume_co(&co)?;
        Ok(cid)
    }

    /// Transfer control into a suspended or newly created coroutine.
    /// Returns to the caller only when the target next yields or ends.
    pub fn resume(&self, cid: Cid) -> Result<(), CoroutineError> {
        let co = self.inner.registry.get(cid).ok_or(CoroutineError::Ended)?;
        self.resume_co(&co)
    }

    fn resume_co(&self, co: &Arc<Coroutine>) -> Result<(), CoroutineError> {
        match co.state() {
            State::Init | State::Waiting => {}
            State::Running => return Err(CoroutineError::InvalidContext),
            State::Ended => return Err(CoroutineError::Ended),
        }

        let previous = {
            let mut current = self.inner.current.lock();
            let previous = *current;
            *current = Some(co.cid());
            previous
        };
        co.set_origin(previous);
        self.fire(self.inner.hooks.on_resume());
        co.set_state(State::Running);

        co.context().swap_in();
        self.check_end(co);
        Ok(())
    }

    /// Suspend the currently executing coroutine at exactly this point;
    /// execution continues here when a future resume targets it again.
    /// Calling this outside any coroutine takes the fatal path.
    pub fn yield_current(&self) {
        let Some(cid) = self.current_cid() else {
            self.fatal("yield must be called from inside a coroutine");
        };
        let Some(co) = self.inner.registry.get(cid) else {
            self.fatal("current coroutine is missing from the registry");
        };

        self.fire(self.inner.hooks.on_yield());
        co.set_state(State::Waiting);
        *self.inner.current.lock() = co.origin_cid();
        co.context().swap_out();
    }

    /// After a swap has returned to the resumer: close an ended coroutine,
    /// or carry an armed bailout outwards.
    fn check_end(&self, co: &Arc<Coroutine>) {
        if co.context().is_ended() {
            self.close(co);
        } else if self.inner.hooks.bailout_armed() {
            if self.current_cid().is_some() {
                // Unwind has reached a nested resume frame; keep yielding
                // until control is back in the outermost driver.
                self.yield_current();
            } else {
                if let Some(handler) = self.inner.hooks.take_bailout() {
                    handler();
                }
                self.fatal("coroutine bailout: control-transfer state is inconsistent");
            }
        }
    }

    /// Close an ended coroutine: on-close hook first (object and task still
    /// valid, ambient `current` is the closing coroutine), then registry
    /// removal, then release of the stack context.
    fn close(&self, co: &Arc<Coroutine>) {
        co.set_state(State::Ended);
        self.fire(self.inner.hooks.on_close());
        *self.inner.current.lock() = co.origin_cid();
        self.inner.registry.remove(co.cid());
        co.context().finalize();
        tracing::debug!("closed {}", co.cid());
    }

    /// Arm the bailout handler and unwind to the outermost driver, where
    /// the handler fires once and the fatal path terminates the process.
    /// Must be called from inside a coroutine; does not return under
    /// normal operation.
    pub fn bailout<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.current_cid().is_none() {
            handler();
            self.fatal("bailout invoked outside any coroutine");
        }
        self.inner.hooks.arm_bailout(Arc::new(handler));
        self.yield_current();
    }

    fn fire(&self, hook: Option<SwapHook>) {
        if let Some(hook) = hook {
            hook(self);
        }
    }

    fn fatal(&self, msg: &str) -> ! {
        self.inner.hooks.fatal(msg)
    }

    // ---- ambient queries ------------------------------------------------

    /// Identity of the executing coroutine, or `None` in the outer driver.
    #[inline]
    pub fn current_cid(&self) -> Option<Cid> {
        *self.inner.current.lock()
    }

    /// The executing coroutine, or `None` in the outer driver.
    #[inline]
    pub fn current(&self) -> Option<Arc<Coroutine>> {
        self.current_cid().and_then(|cid| self.inner.registry.get(cid))
    }

    /// The executing coroutine. Documented as requiring coroutine context:
    /// invoked from the outer driver, this escalates to the fatal reporter
    /// instead of returning an absent value.
    pub fn current_or_fail(&self) -> Arc<Coroutine> {
        match self.current() {
            Some(co) => co,
            None => self.fatal("API must be called in the coroutine"),
        }
    }

    /// Task payload of the executing coroutine, if any.
    #[inline]
    pub fn current_task(&self) -> Option<Task> {
        self.current().and_then(|co| co.task())
    }

    /// Look up a live coroutine by identity.
    #[inline]
    pub fn get_by_cid(&self, cid: Cid) -> Option<Arc<Coroutine>> {
        self.inner.registry.get(cid)
    }

    /// Task payload of a live coroutine by identity.
    #[inline]
    pub fn task_by_cid(&self, cid: Cid) -> Option<Task> {
        self.get_by_cid(cid).and_then(|co| co.task())
    }

    /// Milliseconds since construction for the given identity, or for the
    /// executing coroutine when `cid` is `None`. Closed identities report
    /// `None`, the Ended sentinel.
    pub fn elapsed_msec(&self, cid: Option<Cid>) -> Option<u64> {
        let co = match cid {
            Some(cid) => self.get_by_cid(cid),
            None => self.current(),
        };
        co.map(|co| co.elapsed_msec())
    }

    /// Last identity handed out by this instance.
    #[inline]
    pub fn last_cid(&self) -> Option<Cid> {
        self.inner.cids.last()
    }

    /// Number of live coroutines.
    #[inline]
    pub fn count(&self) -> usize {
        self.inner.registry.count()
    }

    /// High-water mark of concurrently live coroutines.
    #[inline]
    pub fn peak_count(&self) -> usize {
        self.inner.registry.peak_count()
    }

    // ---- stack policy ---------------------------------------------------

    /// Default stack size new coroutines receive.
    #[inline]
    pub fn stack_size(&self) -> usize {
        self.inner.stack_size.load(Ordering::SeqCst)
    }

    /// Update the default stack size. The request is clamped to
    /// `[MIN_STACK_SIZE, MAX_STACK_SIZE]` and rounded up to `STACK_ALIGN`;
    /// already-existing coroutines keep their captured size.
    #[inline]
    pub fn set_stack_size(&self, size: usize) {
        self.inner
            .stack_size
            .store(aligned_stack_size(size), Ordering::SeqCst);
    }

    // ---- hooks ----------------------------------------------------------

    /// Register the on-yield hook, replacing any previous handler.
    pub fn set_on_yield<F>(&self, hook: F)
    where
        F: Fn(&Scheduler) + Send + Sync + 'static,
    {
        self.inner.hooks.set_on_yield(Arc::new(hook));
    }

    /// Register the on-resume hook, replacing any previous handler.
    pub fn set_on_resume<F>(&self, hook: F)
    where
        F: Fn(&Scheduler) + Send + Sync + 'static,
    {
        self.inner.hooks.set_on_resume(Arc::new(hook));
    }

    /// Register the on-close hook, replacing any previous handler.
    pub fn set_on_close<F>(&self, hook: F)
    where
        F: Fn(&Scheduler) + Send + Sync + 'static,
    {
        self.inner.hooks.set_on_close(Arc::new(hook));
    }

    /// Register the fatal handler. A test harness may panic from it to
    /// trap the fatal path; production leaves it unset and aborts.
    pub fn set_fatal_handler<F>(&self, hook: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.inner.hooks.set_fatal(Arc::new(hook));
    }

    // ---- diagnostics surface --------------------------------------------

    /// Snapshot of all live coroutines, ordered by identity.
    pub fn snapshot(&self) -> Vec<Arc<Coroutine>> {
        self.inner.registry.snapshot()
    }

    /// Tooling snapshot of every live coroutine.
    pub fn infos(&self) -> Vec<CoroutineInfo> {
        self.inner.registry.infos()
    }

    /// Reset the enumeration cursor to the current live set.
    pub fn iter_reset(&self) {
        self.inner.registry.iter_reset();
    }

    /// Next live coroutine under the enumeration cursor.
    pub fn iter_next(&self) -> Option<Arc<Coroutine>> {
        self.inner.registry.iter_next()
    }

    /// Dump the live set through the logger.
    pub fn print_list(&self) {
        self.inner.registry.print_list();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
