//! Swap hooks and the fatal reporter.
//!
//! Three single-slot callbacks observe every control transfer: on-yield
//! (just before a coroutine suspends), on-resume (just before a coroutine
//! is given control) and on-close (just before a coroutine's resources are
//! released, with the object still valid). Registering a handler replaces
//! the previous one. Hooks receive the scheduler handle and read ambient
//! state through it; the engine never depends on what they do.
//!
//! The bailout slot is different: it is *armed* once, by
//! [`Scheduler::bailout`](super::Scheduler::bailout), and fired when the
//! unwind reaches the outermost driver. The fatal slot lets embedders trap
//! what would otherwise be a process abort.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

use super::Scheduler;

/// Callback invoked around a control transfer.
pub type SwapHook = Arc<dyn Fn(&Scheduler) + Send + Sync>;

/// Callback fired once when a bailout unwind reaches the outer driver.
pub type BailoutHook = Arc<dyn Fn() + Send + Sync>;

/// Handler given fatal messages before the process terminates. A test
/// harness may panic from here to trap the fatal path; if the handler
/// returns, the process aborts.
pub type FatalHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Hook storage for one scheduler instance.
pub(crate) struct HookSlots {
    on_yield: RwLock<Option<SwapHook>>,
    on_resume: RwLock<Option<SwapHook>>,
    on_close: RwLock<Option<SwapHook>>,
    bailout: Mutex<Option<BailoutHook>>,
    fatal: RwLock<Option<FatalHook>>,
}

impl std::fmt::Debug for HookSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookSlots")
            .field("bailout_armed", &self.bailout_armed())
            .finish()
    }
}

impl HookSlots {
    pub(crate) fn new() -> Self {
        Self {
            on_yield: RwLock::new(None),
            on_resume: RwLock::new(None),
            on_close: RwLock::new(None),
            bailout: Mutex::new(None),
            fatal: RwLock::new(None),
        }
    }

    pub(crate) fn set_on_yield(&self, hook: SwapHook) {
        *self.on_yield.write() = Some(hook);
    }

    pub(crate) fn set_on_resume(&self, hook: SwapHook) {
        *self.on_resume.write() = Some(hook);
    }

    pub(crate) fn set_on_close(&self, hook: SwapHook) {
        *self.on_close.write() = Some(hook);
    }

    pub(crate) fn on_yield(&self) -> Option<SwapHook> {
        self.on_yield.read().clone()
    }

    pub(crate) fn on_resume(&self) -> Option<SwapHook> {
        self.on_resume.read().clone()
    }

    pub(crate) fn on_close(&self) -> Option<SwapHook> {
        self.on_close.read().clone()
    }

    pub(crate) fn arm_bailout(&self, hook: BailoutHook) {
        *self.bailout.lock() = Some(hook);
    }

    pub(crate) fn bailout_armed(&self) -> bool {
        self.bailout.lock().is_some()
    }

    pub(crate) fn take_bailout(&self) -> Option<BailoutHook> {
        self.bailout.lock().take()
    }

    pub(crate) fn set_fatal(&self, hook: FatalHook) {
        *self.fatal.write() = Some(hook);
    }

    /// The fatal path: log, give a registered handler the chance to trap,
    /// then terminate. There is no recovery.
    pub(crate) fn fatal(&self, msg: &str) -> ! {
        tracing::error!("{msg}");
        let handler = self.fatal.read().clone();
        if let Some(handler) = handler {
            handler(msg);
        }
        std::process::abort();
    }
}
