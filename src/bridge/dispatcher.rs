//! Worker pool executing bridged one-shot operations.
//!
//! Jobs enter through a bounded queue; a full queue is a synchronous
//! rejection surfaced to the bridge caller, never a blocking submit.
//! Each job carries its own completion sender, so every accepted job
//! produces exactly one completion message even when the handler panics.

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use super::event::AsyncEvent;
use crate::coroutine::Cid;

/// One-shot operation run on a dispatch worker.
pub type Handler = Box<dyn FnOnce(&mut AsyncEvent) + Send>;

/// A bridged operation waiting for a worker.
pub struct Job {
    pub seq: u64,
    pub cid: Cid,
    pub handler: Handler,
    pub event: AsyncEvent,
    pub completions: Sender<Completion>,
}

/// Completion notification delivered back to the driver loop.
#[derive(Debug)]
pub struct Completion {
    pub seq: u64,
    pub cid: Cid,
    pub event: AsyncEvent,
}

/// Fixed-size worker pool behind a bounded job queue.
pub struct Dispatcher {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("workers", &self.workers.len())
            .finish()
    }
}

impl Dispatcher {
    /// Spawn `num_workers` workers behind a queue of `queue_size` slots.
    pub fn new(num_workers: usize, queue_size: usize) -> Self {
        let (jobs, intake) = bounded::<Job>(queue_size);

        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let intake = intake.clone();
            let worker = thread::Builder::new()
                .name(format!("xiecheng-aio-{}", worker_id))
                .spawn(move || Self::worker_loop(intake))
                .expect("Failed to spawn dispatch worker thread");
            workers.push(worker);
        }

        Self {
            jobs: Some(jobs),
            workers,
        }
    }

    /// Worker main loop: run jobs until the queue disconnects.
    fn worker_loop(intake: Receiver<Job>) {
        while let Ok(job) = intake.recv() {
            let Job {
                seq,
                cid,
                handler,
                mut event,
                completions,
            } = job;

            if catch_unwind(AssertUnwindSafe(|| handler(&mut event))).is_err() {
                tracing::error!("async handler for {} panicked", cid);
            }
            // The driver may already have fired the timeout for this seq;
            // it drops stale completions.
            let _ = completions.send(Completion { seq, cid, event });
        }
    }

    /// Submit a job without blocking. A saturated (or shut down) queue
    /// hands the job back to the caller.
    pub fn try_submit(&self, job: Job) -> Result<(), Job> {
        let Some(jobs) = &self.jobs else {
            return Err(job);
        };
        jobs.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) | TrySendError::Disconnected(job) => job,
        })
    }

    /// Disconnect the queue and wait for the workers to drain.
    pub fn shutdown(&mut self) {
        drop(self.jobs.take());
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
