//! Bridge 单元测试
//!
//! 覆盖调度拒绝、完成与超时竞争

use crate::bridge::{AsyncEvent, Runtime, RuntimeConfig};
use crate::coroutine::CoroutineError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_dispatch_outside_coroutine_is_refused() {
    let rt = Runtime::new();
    assert!(!rt.dispatch_fn(|| {}, None));

    let mut event = AsyncEvent::with_data(9u8);
    assert!(!rt.dispatch(|_ev: &mut AsyncEvent| {}, &mut event, None));
    // The event is handed back untouched.
    assert_eq!(event.take_data::<u8>(), Some(9));
}

#[test]
fn test_completion_before_timeout_delivers_result() {
    let rt = Runtime::new();
    let outcome: Arc<Mutex<Option<(bool, bool, Option<u32>)>>> = Arc::new(Mutex::new(None));

    let slot = outcome.clone();
    rt.run(move |rt| {
        let mut event = AsyncEvent::new();
        let ok = rt.dispatch(
            |ev: &mut AsyncEvent| ev.set_data(42u32),
            &mut event,
            Some(Duration::from_secs(5)),
        );
        *slot.lock() = Some((ok, event.timed_out(), event.take_data::<u32>()));
    })
    .unwrap();

    let (ok, timed_out, data) = outcome.lock().take().unwrap();
    assert!(ok);
    assert!(!timed_out);
    assert_eq!(data, Some(42));
}

#[test]
fn test_timeout_before_completion_discards_result() {
    let rt = Runtime::new();
    let outcome: Arc<Mutex<Option<(bool, bool, Option<u32>)>>> = Arc::new(Mutex::new(None));

    let slot = outcome.clone();
    rt.run(move |rt| {
        let mut event = AsyncEvent::new();
        let ok = rt.dispatch(
            |ev: &mut AsyncEvent| {
                thread::sleep(Duration::from_millis(300));
                ev.set_data(1u32);
            },
            &mut event,
            Some(Duration::from_millis(25)),
        );
        *slot.lock() = Some((ok, event.timed_out(), event.take_data::<u32>()));
    })
    .unwrap();

    // The deadline won the race: the coroutine was suspended and resumed
    // (true), but the handler's late result was discarded.
    let (ok, timed_out, data) = outcome.lock().take().unwrap();
    assert!(ok);
    assert!(timed_out);
    assert_eq!(data, None);
}

#[test]
fn test_saturated_queue_rejects_without_suspending() {
    let rt = Runtime::with_config(RuntimeConfig {
        dispatch_workers: 1,
        dispatch_queue_size: 1,
        ..RuntimeConfig::default()
    });
    let rejected = Arc::new(AtomicBool::new(false));

    let flag = rejected.clone();
    rt.run(move |rt| {
        let sched = rt.scheduler();

        // Occupy the single worker.
        let busy = rt.clone();
        sched
            .create(move |_| {
                busy.dispatch_fn(|| thread::sleep(Duration::from_millis(400)), None);
            })
            .unwrap();
        // Give the worker time to take the job off the queue.
        thread::sleep(Duration::from_millis(50));

        // Fill the single queue slot.
        let queued = rt.clone();
        sched
            .create(move |_| {
                queued.dispatch_fn(|| {}, None);
            })
            .unwrap();

        // Third submission finds the queue full and fails synchronously.
        let full = rt.clone();
        let flag = flag.clone();
        sched
            .create(move |_| {
                flag.store(!full.dispatch_fn(|| {}, None), Ordering::SeqCst);
            })
            .unwrap();
    })
    .unwrap();

    assert!(rejected.load(Ordering::SeqCst));
}

#[test]
fn test_run_inside_coroutine_is_invalid() {
    let rt = Runtime::new();
    let observed: Arc<Mutex<Option<Result<(), CoroutineError>>>> = Arc::new(Mutex::new(None));

    let slot = observed.clone();
    rt.run(move |rt| {
        let nested = rt.run(|_| {}).map(|_| ());
        *slot.lock() = Some(nested);
    })
    .unwrap();

    assert_eq!(*observed.lock(), Some(Err(CoroutineError::InvalidContext)));
}

#[test]
fn test_handler_runs_on_dispatch_worker() {
    let rt = Runtime::new();
    let worker_name: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let slot = worker_name.clone();
    rt.run(move |rt| {
        let name = slot.clone();
        rt.dispatch_fn(
            move || {
                *name.lock() = thread::current().name().map(String::from);
            },
            None,
        );
    })
    .unwrap();

    let name = worker_name.lock().take().expect("handler ran");
    assert!(name.starts_with("xiecheng-aio-"));
}
