//! Control-transfer seam between a coroutine and its driver.
//!
//! Everything above this module sees a four-call surface: [`StackContext::swap_in`]
//! (driver side), [`StackContext::swap_out`] (coroutine side), [`StackContext::is_ended`]
//! and [`StackContext::finalize`]. The implementation dedicates one carrier
//! thread per coroutine — the coroutine's stack is the carrier's stack, sized
//! by the stack policy — and moves the single logical thread of control
//! between the two sides with a Mutex/Condvar handoff token. Exactly one
//! side runs at any instant; `swap_in` blocks the resumer until the body
//! yields or returns, `swap_out` blocks the body until the next resume.

use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Which side of the seam currently holds the thread of control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Driver,
    Coroutine,
}

/// Handoff token shared between the driver side and the carrier.
#[derive(Debug)]
struct Transfer {
    side: Side,
    /// The body function has returned (or unwound).
    ended: bool,
    /// The context was dropped before the body ever started.
    abandoned: bool,
}

#[derive(Debug)]
struct Shared {
    transfer: Mutex<Transfer>,
    cond: Condvar,
}

/// One raw execution stack plus the ability to swap the thread of control
/// into and out of it.
pub struct StackContext {
    shared: Arc<Shared>,
    carrier: Mutex<Option<JoinHandle<()>>>,
    started: Mutex<bool>,
}

impl std::fmt::Debug for StackContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StackContext")
            .field("ended", &self.is_ended())
            .finish()
    }
}

impl StackContext {
    /// Allocate a context with the given stack size and body. The carrier
    /// is spawned immediately but the body does not run until the first
    /// [`swap_in`](Self::swap_in).
    pub fn new<F>(stack_size: usize, name: &str, body: F) -> std::io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(Shared {
            transfer: Mutex::new(Transfer {
                side: Side::Driver,
                ended: false,
                abandoned: false,
            }),
            cond: Condvar::new(),
        });

        let carrier_shared = shared.clone();
        let carrier = thread::Builder::new()
            .name(name.to_string())
            .stack_size(stack_size)
            .spawn(move || Self::carrier_main(carrier_shared, body))?;

        Ok(Self {
            shared,
            carrier: Mutex::new(Some(carrier)),
            started: Mutex::new(false),
        })
    }

    /// Carrier entry: wait for the first transfer in, run the body, then
    /// hand control back for good.
    fn carrier_main<F>(shared: Arc<Shared>, body: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut transfer = shared.transfer.lock();
            while transfer.side != Side::Coroutine {
                if transfer.abandoned {
                    return;
                }
                shared.cond.wait(&mut transfer);
            }
        }

        if catch_unwind(AssertUnwindSafe(body)).is_err() {
            tracing::error!("coroutine body panicked; treating as normal end");
        }

        let mut transfer = shared.transfer.lock();
        transfer.ended = true;
        transfer.side = Side::Driver;
        shared.cond.notify_all();
    }

    /// Transfer the thread of control into this stack. Called from the
    /// driver side; returns when the body yields or returns.
    pub fn swap_in(&self) {
        *self.started.lock() = true;
        let mut transfer = self.shared.transfer.lock();
        debug_assert_eq!(transfer.side, Side::Driver);
        debug_assert!(!transfer.ended);
        transfer.side = Side::Coroutine;
        self.shared.cond.notify_all();
        while transfer.side != Side::Driver {
            self.shared.cond.wait(&mut transfer);
        }
    }

    /// Transfer the thread of control back to the driver side. Called from
    /// inside the body; returns when the next `swap_in` targets this stack.
    pub fn swap_out(&self) {
        let mut transfer = self.shared.transfer.lock();
        debug_assert_eq!(transfer.side, Side::Coroutine);
        transfer.side = Side::Driver;
        self.shared.cond.notify_all();
        while transfer.side != Side::Coroutine {
            self.shared.cond.wait(&mut transfer);
        }
    }

    /// Whether the body has returned. Meaningful after a `swap_in` call
    /// has returned to the driver side.
    #[inline]
    pub fn is_ended(&self) -> bool {
        self.shared.transfer.lock().ended
    }

    /// Release the carrier. Must only be called once the body has ended.
    pub fn finalize(&self) {
        debug_assert!(self.is_ended());
        if let Some(handle) = self.carrier.lock().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StackContext {
    fn drop(&mut self) {
        if self.is_ended() {
            self.finalize();
            return;
        }
        if !*self.started.lock() {
            // Body never ran; wake the carrier so it can exit cleanly.
            {
                let mut transfer = self.shared.transfer.lock();
                transfer.abandoned = true;
                self.shared.cond.notify_all();
            }
            if let Some(handle) = self.carrier.lock().take() {
                let _ = handle.join();
            }
            return;
        }
        // Suspended mid-body: the stack cannot be unwound without a
        // cancellation primitive, so the parked carrier is abandoned with
        // the process.
        tracing::debug!("suspended coroutine context abandoned");
        drop(self.carrier.lock().take());
    }
}
