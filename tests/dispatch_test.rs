//! Dispatch policy: inline versus queued execution by calling thread

use light_threads::prelude::*;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Context whose main thread is the calling test thread
fn setup() -> (Looper, Arc<LightThreads>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let looper = Looper::new();
    let threads = LightThreads::builder(Arc::new(looper.handle()))
        .with_executors(Executors::new().with_parallelism(1))
        .build()
        .expect("Failed to build context");
    (looper, Arc::new(threads))
}

#[test]
fn test_main_thread_identity() {
    let (_looper, threads) = setup();
    assert!(threads.is_on_main_thread());

    let t = Arc::clone(&threads);
    let off_main = thread::spawn(move || t.is_on_main_thread())
        .join()
        .expect("thread panicked");
    assert!(!off_main);
    threads.shutdown().expect("Failed to shutdown");
}

#[test]
fn test_foreground_on_main_runs_before_return() {
    let (looper, threads) = setup();
    let ran = Arc::new(AtomicBool::new(false));

    let r = Arc::clone(&ran);
    threads
        .run_in_foreground(move || r.store(true, Ordering::SeqCst))
        .expect("Failed to run");

    assert!(ran.load(Ordering::SeqCst));
    assert_eq!(looper.pending(), 0);
    threads.shutdown().expect("Failed to shutdown");
}

#[test]
fn test_foreground_from_worker_is_queued_fifo() {
    let (looper, threads) = setup();
    let order = Arc::new(Mutex::new(Vec::new()));

    let t = Arc::clone(&threads);
    let o = Arc::clone(&order);
    let ran_before_return = thread::spawn(move || {
        let mut early = false;
        for i in 0..10 {
            let o2 = Arc::clone(&o);
            t.run_in_foreground(move || o2.lock().push(i))
                .expect("Failed to post");
            early |= !o.lock().is_empty();
        }
        early
    })
    .join()
    .expect("poster panicked");

    assert!(!ran_before_return);
    assert_eq!(looper.run_pending().expect("run failed"), 10);
    assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    threads.shutdown().expect("Failed to shutdown");
}

#[test]
fn test_delayed_foreground_fires_after_delay_in_order() {
    let (looper, threads) = setup();
    let fired = Arc::new(Mutex::new(Vec::new()));
    let delay = Duration::from_millis(50);

    let posted_at = Instant::now();
    for i in 0..3 {
        let f = Arc::clone(&fired);
        threads
            .run_in_foreground_delayed(move || f.lock().push((i, Instant::now())), delay)
            .expect("Failed to post");
    }
    // Delayed posts never run inline
    assert!(fired.lock().is_empty());

    looper
        .run_until(Instant::now() + Duration::from_millis(200))
        .expect("run failed");

    let fired = fired.lock();
    assert_eq!(fired.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![0, 1, 2]);
    for (_, at) in fired.iter() {
        assert!(*at >= posted_at + delay);
    }
    threads.shutdown().expect("Failed to shutdown");
}

#[test]
fn test_background_off_main_runs_inline() {
    let (_looper, threads) = setup();

    let t = Arc::clone(&threads);
    let (caller, runner, handle_absent, elapsed) = thread::spawn(move || {
        let caller = thread::current().id();
        let runner = Arc::new(Mutex::new(None));
        let r = Arc::clone(&runner);
        let start = Instant::now();
        let handle = t
            .run_in_background(move || {
                thread::sleep(Duration::from_millis(30));
                *r.lock() = Some(thread::current().id());
                Ok(())
            })
            .expect("Failed to run");
        let runner = runner.lock().take();
        (caller, runner, handle.is_none(), start.elapsed())
    })
    .join()
    .expect("caller panicked");

    assert!(handle_absent);
    assert_eq!(runner, Some(caller));
    assert!(elapsed >= Duration::from_millis(30));
    assert_eq!(threads.background().stats().threads_created, 0);
    threads.shutdown().expect("Failed to shutdown");
}

#[test]
fn test_background_from_main_goes_to_pool() {
    let (_looper, threads) = setup();
    let main = thread::current().id();

    let handle = threads
        .run_in_background(move || {
            assert_ne!(thread::current().id(), main);
            Ok(())
        })
        .expect("Failed to submit")
        .expect("expected a handle");

    handle.join().expect("task failed");
    assert_eq!(threads.background().stats().threads_created, 1);
    threads.shutdown().expect("Failed to shutdown");
}

#[test]
fn test_background_failure_stays_in_handle() {
    let (_looper, threads) = setup();

    let handle = threads
        .run_in_background(|| Err(ThreadError::other("async failure")))
        .expect("submission itself must succeed")
        .expect("expected a handle");

    assert_eq!(handle.join(), Err(ThreadError::other("async failure")));
    threads.shutdown().expect("Failed to shutdown");
}

#[test]
fn test_background_delayed() {
    let (_looper, threads) = setup();
    let start = Instant::now();
    let ran_at = Arc::new(Mutex::new(None));

    let r = Arc::clone(&ran_at);
    let handle = threads
        .run_in_background_delayed(
            move || {
                *r.lock() = Some(Instant::now());
                Ok(())
            },
            Duration::from_millis(40),
        )
        .expect("Failed to schedule");

    handle.join().expect("task failed");
    let ran_at = ran_at.lock().expect("task did not run");
    assert!(ran_at >= start + Duration::from_millis(40));
    threads.shutdown().expect("Failed to shutdown");
}

#[test]
fn test_schedule_returns_value_and_can_cancel() {
    let (_looper, threads) = setup();

    let value = threads
        .schedule(|| Ok(String::from("scheduled")), Duration::from_millis(10))
        .expect("Failed to schedule");
    assert_eq!(value.get(), Ok("scheduled".to_string()));

    let ran = Arc::new(AtomicBool::new(false));
    let r = Arc::clone(&ran);
    let cancelled = threads
        .schedule(
            move || {
                r.store(true, Ordering::SeqCst);
                Ok(())
            },
            Duration::from_millis(100),
        )
        .expect("Failed to schedule");
    assert!(cancelled.cancel());

    thread::sleep(Duration::from_millis(150));
    assert!(!ran.load(Ordering::SeqCst));
    assert!(matches!(cancelled.get(), Err(e) if e.is_cancellation()));
    threads.shutdown().expect("Failed to shutdown");
}

#[test]
fn test_schedule_at_fixed_rate_until_cancelled() {
    let (_looper, threads) = setup();
    let ticks = Arc::new(AtomicUsize::new(0));

    let t = Arc::clone(&ticks);
    let handle = threads
        .schedule_at_fixed_rate(
            move || {
                t.fetch_add(1, Ordering::SeqCst);
                Ok(())
            },
            Duration::from_millis(10),
            Duration::from_millis(20),
        )
        .expect("Failed to schedule");

    thread::sleep(Duration::from_millis(150));
    assert!(handle.cancel());
    let at_cancel = ticks.load(Ordering::SeqCst);
    assert!(at_cancel >= 3);

    thread::sleep(Duration::from_millis(60));
    // At most one run that was already in flight
    assert!(ticks.load(Ordering::SeqCst) <= at_cancel + 1);
    threads.shutdown().expect("Failed to shutdown");
}

#[test]
fn test_foreground_after_quit_fails() {
    let (looper, threads) = setup();
    looper.handle().quit();

    let t = Arc::clone(&threads);
    let result = thread::spawn(move || t.run_in_foreground(|| {}))
        .join()
        .expect("poster panicked");
    assert_eq!(result, Err(ThreadError::MainLoopClosed));
    threads.shutdown().expect("Failed to shutdown");
}
