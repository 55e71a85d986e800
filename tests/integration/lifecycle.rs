//! End-to-end lifecycle scenarios over the public API.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use xiecheng::{Cid, Scheduler, State};

#[test]
fn test_ping_pong_between_two_coroutines() {
    let sched = Scheduler::new();
    let trace: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let ping_trace = trace.clone();
    let ping = sched
        .create(move |s| {
            for _ in 0..3 {
                ping_trace.lock().push("ping");
                s.yield_current();
            }
        })
        .unwrap();

    let pong_trace = trace.clone();
    let pong = sched
        .create(move |s| {
            for _ in 0..3 {
                pong_trace.lock().push("pong");
                s.yield_current();
            }
        })
        .unwrap();

    // Alternate resumes until both bodies return.
    for _ in 0..3 {
        let _ = sched.resume(ping);
        let _ = sched.resume(pong);
    }

    assert_eq!(sched.count(), 0);
    let trace = trace.lock();
    assert_eq!(*trace, vec!["ping", "pong", "ping", "pong", "ping", "pong"]);
}

#[test]
fn test_close_hook_logs_completion_order() {
    let sched = Scheduler::new();
    let log: Arc<Mutex<Vec<Cid>>> = Arc::new(Mutex::new(Vec::new()));

    let close_log = log.clone();
    sched.set_on_close(move |s| {
        close_log.lock().push(s.current_or_fail().cid());
    });

    // Three waiting coroutines, completed out of creation order.
    let cids: Vec<Cid> = (0..3)
        .map(|_| sched.create(|s| s.yield_current()).unwrap())
        .collect();
    sched.resume(cids[2]).unwrap();
    sched.resume(cids[0]).unwrap();
    sched.resume(cids[1]).unwrap();

    assert_eq!(*log.lock(), vec![cids[2], cids[0], cids[1]]);
}

#[test]
fn test_deep_nested_creation() {
    let sched = Scheduler::new();
    let depth = Arc::new(AtomicUsize::new(0));

    fn descend(s: &Scheduler, depth: Arc<AtomicUsize>, remaining: usize) {
        depth.fetch_add(1, Ordering::SeqCst);
        if remaining > 0 {
            let inner = depth.clone();
            s.create(move |s| descend(s, inner, remaining - 1)).unwrap();
        }
    }

    let counter = depth.clone();
    sched
        .create(move |s| descend(s, counter, 4))
        .unwrap();

    assert_eq!(depth.load(Ordering::SeqCst), 5);
    assert_eq!(sched.count(), 0);
    assert_eq!(sched.peak_count(), 5);
}

#[test]
fn test_states_observed_through_held_handle() {
    let sched = Scheduler::new();
    let cid = sched.create(|s| s.yield_current()).unwrap();

    let co = sched.get_by_cid(cid).unwrap();
    assert_eq!(co.state(), State::Waiting);

    sched.resume(cid).unwrap();
    // The registry dropped its reference; ours still observes the end.
    assert_eq!(co.state(), State::Ended);
    assert!(co.is_ended());
    assert!(sched.get_by_cid(cid).is_none());
}

#[test]
fn test_independent_scheduler_instances_share_nothing() {
    let a = Scheduler::new();
    let b = Scheduler::new();

    let cid = a.create(|s| s.yield_current()).unwrap();
    assert_eq!(a.count(), 1);
    assert_eq!(b.count(), 0);
    // The handle is meaningless on the other instance.
    assert!(b.get_by_cid(cid).is_none());

    a.resume(cid).unwrap();
    assert_eq!(a.count(), 0);
}
