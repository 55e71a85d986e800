//! End-to-end bridge scenarios over the public API.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use xiecheng::{run, AsyncEvent, Runtime};

#[test]
fn test_run_drives_multiple_bridged_waits() {
    let results: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));

    let outer = results.clone();
    run(move |rt| {
        let sched = rt.scheduler();
        for i in 0..3u32 {
            let rt = rt.clone();
            let results = outer.clone();
            sched
                .create(move |_| {
                    let mut event = AsyncEvent::new();
                    let ok = rt.dispatch(
                        move |ev: &mut AsyncEvent| {
                            thread::sleep(Duration::from_millis(10 * (3 - i) as u64));
                            ev.set_data(i * 10);
                        },
                        &mut event,
                        Some(Duration::from_secs(5)),
                    );
                    assert!(ok);
                    results.lock().push(event.take_data::<u32>().unwrap());
                })
                .unwrap();
        }
    })
    .unwrap();

    // All three waits resolved; completion order follows handler latency.
    let mut results = results.lock().clone();
    results.sort_unstable();
    assert_eq!(results, vec![0, 10, 20]);
}

#[test]
fn test_mixed_timeout_and_completion() {
    let timed_out = Arc::new(AtomicUsize::new(0));
    let completed = Arc::new(AtomicUsize::new(0));

    let slow = timed_out.clone();
    let fast = completed.clone();
    run(move |rt| {
        let sched = rt.scheduler();

        let rt_slow = rt.clone();
        sched
            .create(move |_| {
                let mut event = AsyncEvent::new();
                rt_slow.dispatch(
                    |_ev: &mut AsyncEvent| thread::sleep(Duration::from_millis(250)),
                    &mut event,
                    Some(Duration::from_millis(20)),
                );
                if event.timed_out() {
                    slow.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        let rt_fast = rt.clone();
        sched
            .create(move |_| {
                let mut event = AsyncEvent::new();
                rt_fast.dispatch(
                    |ev: &mut AsyncEvent| ev.set_data(1u8),
                    &mut event,
                    Some(Duration::from_secs(5)),
                );
                if !event.timed_out() && event.has_data() {
                    fast.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();
    })
    .unwrap();

    assert_eq!(timed_out.load(Ordering::SeqCst), 1);
    assert_eq!(completed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_sequential_dispatches_from_one_coroutine() {
    let rt = Runtime::new();
    let sum = Arc::new(AtomicUsize::new(0));

    let total = sum.clone();
    rt.run(move |rt| {
        for i in 1..=3usize {
            let mut event = AsyncEvent::new();
            let ok = rt.dispatch(
                move |ev: &mut AsyncEvent| ev.set_data(i),
                &mut event,
                None,
            );
            assert!(ok);
            total.fetch_add(event.take_data::<usize>().unwrap(), Ordering::SeqCst);
        }
    })
    .unwrap();

    assert_eq!(sum.load(Ordering::SeqCst), 6);
}

#[test]
fn test_root_identity_is_returned() {
    let rt = Runtime::new();
    let root = rt.run(|_| {}).unwrap();
    assert_eq!(root.value(), 1);
    assert_eq!(rt.scheduler().count(), 0);
}
