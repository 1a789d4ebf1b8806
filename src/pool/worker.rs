//! Worker loop and pool statistics

use crate::core::priority::{self, ThreadPriority};
use crate::core::{BoxedJob, Result, ThreadError};
use crate::pool::factory::PoolThreads;
use crate::queue::{JobQueue, QueueError};
use crate::sink::{self, ExceptionSink};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use tracing::{debug, span, Level};

/// Job counters shared by all threads of a pool
#[derive(Debug, Default)]
pub struct JobCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    rejected: AtomicU64,
}

impl JobCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn increment_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn increment_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Jobs accepted by the pool
    pub fn get_submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Jobs that finished without a reported failure
    pub fn get_completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Jobs that returned or stored an error
    pub fn get_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Jobs that panicked
    pub fn get_panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    /// Submissions refused by the pool
    pub fn get_rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

/// Live thread accounting for one pool
#[derive(Debug, Default)]
pub(crate) struct ThreadSlots {
    live: AtomicUsize,
    largest: AtomicUsize,
}

impl ThreadSlots {
    /// Reserve a slot for a new thread if fewer than `limit` are live
    pub(crate) fn try_reserve(&self, limit: usize) -> bool {
        let mut live = self.live.load(Ordering::Acquire);
        loop {
            if live >= limit {
                return false;
            }
            match self
                .live
                .compare_exchange_weak(live, live + 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.largest.fetch_max(live + 1, Ordering::Relaxed);
                    return true;
                }
                Err(actual) => live = actual,
            }
        }
    }

    /// Give back a slot if more than `core` threads are live
    pub(crate) fn try_retire(&self, core: usize) -> bool {
        let mut live = self.live.load(Ordering::Acquire);
        loop {
            if live <= core {
                return false;
            }
            match self
                .live
                .compare_exchange_weak(live, live - 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(actual) => live = actual,
            }
        }
    }

    pub(crate) fn release(&self) {
        self.live.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub(crate) fn largest(&self) -> usize {
        self.largest.load(Ordering::Relaxed)
    }
}

/// Holds a reserved slot for the lifetime of a thread body
pub(crate) struct LiveThread<'a> {
    slots: &'a ThreadSlots,
    // The slot was given back, or passed on to a replacement
    retired: bool,
}

impl<'a> LiveThread<'a> {
    pub(crate) fn new(slots: &'a ThreadSlots) -> Self {
        Self {
            slots,
            retired: false,
        }
    }

    /// Leave the pool if it has more than `core` threads
    pub(crate) fn try_retire(&mut self, core: usize) -> bool {
        self.retired = self.slots.try_retire(core);
        self.retired
    }

    /// Pass this thread's slot to a replacement started by `spawn`
    pub(crate) fn hand_over(&mut self, spawn: impl FnOnce() -> Result<()>) -> bool {
        match spawn() {
            Ok(()) => {
                self.retired = true;
                true
            }
            Err(e) => {
                log::warn!("no replacement thread, keeping this one: {}", e);
                false
            }
        }
    }
}

impl Drop for LiveThread<'_> {
    fn drop(&mut self) {
        if !self.retired {
            self.slots.release();
        }
    }
}

/// Whether the thread running `job` must hand over to a replacement first,
/// because the job lowers its priority for good
pub(crate) fn lowers_for_good(job: &BoxedJob) -> bool {
    job.priority().is_some_and(priority::is_one_way)
}

/// Point-in-time statistics of a pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    /// Pool name the threads are named after
    pub name: String,
    /// Threads kept alive when idle
    pub core_threads: usize,
    /// Upper bound on live threads
    pub max_threads: usize,
    /// Threads currently alive
    pub live_threads: usize,
    /// Most threads ever alive at once
    pub largest_pool_size: usize,
    /// Threads created over the pool's lifetime
    pub threads_created: usize,
    /// Jobs waiting in the queue
    pub queued_jobs: usize,
    /// Jobs accepted by the pool
    pub jobs_submitted: u64,
    /// Jobs that finished without a reported failure
    pub jobs_completed: u64,
    /// Jobs that returned or stored an error (panics included)
    pub jobs_failed: u64,
    /// Jobs that panicked
    pub jobs_panicked: u64,
    /// Submissions refused by the pool
    pub jobs_rejected: u64,
}

/// Run one job on the current pool thread.
///
/// Panics are caught, the outcome is passed to the sink via
/// [`sink::after_execute`], and the thread's priority is put back to normal
/// so a prioritized job does not leak its priority to the next one.
pub(crate) fn execute_job(job: &mut BoxedJob, counters: &JobCounters, sink: &dyn ExceptionSink) {
    #[cfg(feature = "tracing")]
    let job_span = span!(Level::DEBUG, "job_execution", job_type = job.job_type());
    #[cfg(feature = "tracing")]
    let _job_guard = job_span.enter();

    let start = Instant::now();
    let panic_result = catch_unwind(AssertUnwindSafe(|| job.execute()));
    let elapsed = start.elapsed();

    let error = match panic_result {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e),
        Err(payload) => Some(ThreadError::job_panicked(
            job.job_type(),
            crate::core::job::panic_message(&*payload),
        )),
    };

    match sink::after_execute(sink, job.as_ref(), error) {
        None => {
            counters.increment_completed();
            #[cfg(feature = "tracing")]
            debug!(duration_ms = elapsed.as_millis() as u64, "job completed");
            #[cfg(not(feature = "tracing"))]
            log::trace!("{} completed in {:?}", job.job_type(), elapsed);
        }
        Some(e) => {
            if matches!(e, ThreadError::JobPanicked { .. }) {
                counters.increment_panicked();
            }
            counters.increment_failed();
            #[cfg(feature = "tracing")]
            debug!(duration_ms = elapsed.as_millis() as u64, "job failed");
            #[cfg(not(feature = "tracing"))]
            log::trace!("{} failed after {:?}", job.job_type(), elapsed);
        }
    }

    priority::reset_current();
}

/// State shared by the pool handle and all of its worker threads
pub(crate) struct WorkerShared {
    pub(crate) queue: Arc<dyn JobQueue>,
    pub(crate) sink: Arc<dyn ExceptionSink>,
    pub(crate) counters: JobCounters,
    pub(crate) slots: ThreadSlots,
    pub(crate) threads: PoolThreads,
    pub(crate) core_threads: usize,
    pub(crate) keep_alive: Option<Duration>,
    pub(crate) poll_interval: Duration,
}

/// Start a thread running a [`Worker`] for `first_job`.
///
/// The caller holds the slot for it and keeps it if this fails.
pub(crate) fn spawn_worker(shared: &Arc<WorkerShared>, first_job: Option<BoxedJob>) -> Result<()> {
    let priority = first_job.as_ref().and_then(|job| job.priority());
    let worker = Worker::new(Arc::clone(shared), first_job);
    shared.threads.spawn(priority, move || worker.run())
}

/// Body of one pool thread
pub(crate) struct Worker {
    shared: Arc<WorkerShared>,
    first_job: Option<BoxedJob>,
}

impl Worker {
    /// `first_job` is the job the thread was created for, run before polling
    pub(crate) fn new(shared: Arc<WorkerShared>, first_job: Option<BoxedJob>) -> Self {
        Self { shared, first_job }
    }

    /// Process jobs until the queue is closed and drained, or until this
    /// thread has been idle for the keep-alive time while the pool is above
    /// its core size.
    ///
    /// A job that lowers the thread's priority for good is the last one the
    /// thread runs: a replacement takes its slot first.
    pub(crate) fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        let mut live = LiveThread::new(&shared.slots);

        #[cfg(feature = "tracing")]
        let worker_span = span!(
            Level::DEBUG,
            "worker",
            thread = std::thread::current().name().unwrap_or("unnamed")
        );
        #[cfg(feature = "tracing")]
        let _guard = worker_span.enter();

        if let Some(job) = self.first_job.take() {
            if !Self::run_job(&shared, &mut live, job) {
                return;
            }
        }

        let mut idle_since = Instant::now();
        loop {
            match shared.queue.recv_timeout(shared.poll_interval) {
                Ok(job) => {
                    if !Self::run_job(&shared, &mut live, job) {
                        break;
                    }
                    idle_since = Instant::now();
                }
                Err(QueueError::Empty) => {
                    let expired = shared
                        .keep_alive
                        .is_some_and(|keep_alive| idle_since.elapsed() >= keep_alive);
                    if expired && live.try_retire(shared.core_threads) {
                        log::debug!("retiring idle thread after {:?}", idle_since.elapsed());
                        break;
                    }
                }
                Err(_) => {
                    // Queue closed and drained
                    #[cfg(feature = "tracing")]
                    debug!("worker shutting down");
                    break;
                }
            }
        }
    }

    /// Run one job; false if this thread handed its slot over and must exit
    fn run_job(shared: &Arc<WorkerShared>, live: &mut LiveThread<'_>, mut job: BoxedJob) -> bool {
        let handed_over = lowers_for_good(&job) && live.hand_over(|| spawn_worker(shared, None));
        execute_job(&mut job, &shared.counters, &*shared.sink);
        if handed_over {
            log::debug!(
                "{} left this thread at {}; exiting",
                job.job_type(),
                ThreadPriority::current()
            );
        }
        !handed_over
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ClosureJob, PriorityJob, ThreadPriority};
    use crate::pool::factory::ThreadFactory;
    use crate::queue::ChannelQueue;
    use crate::sink::{FailureContext, LogSink};
    use parking_lot::Mutex;
    use std::thread;

    fn shared(queue: Arc<dyn JobQueue>, keep_alive: Option<Duration>) -> Arc<WorkerShared> {
        Arc::new(WorkerShared {
            queue,
            sink: Arc::new(LogSink),
            counters: JobCounters::new(),
            slots: ThreadSlots::default(),
            threads: PoolThreads::new(ThreadFactory::new("Worker", Arc::new(LogSink))),
            core_threads: 0,
            keep_alive,
            poll_interval: Duration::from_millis(10),
        })
    }

    #[test]
    fn test_thread_slots() {
        let slots = ThreadSlots::default();
        assert!(slots.try_reserve(2));
        assert!(slots.try_reserve(2));
        assert!(!slots.try_reserve(2));
        assert_eq!(slots.live(), 2);
        assert_eq!(slots.largest(), 2);

        assert!(slots.try_retire(1));
        assert!(!slots.try_retire(1));
        slots.release();
        assert_eq!(slots.live(), 0);
        assert_eq!(slots.largest(), 2);
    }

    #[test]
    fn test_hand_over_passes_the_slot() {
        let slots = ThreadSlots::default();

        assert!(slots.try_reserve(1));
        {
            let mut live = LiveThread::new(&slots);
            assert!(live.hand_over(|| Ok(())));
        }
        // Still owned, by the replacement
        assert_eq!(slots.live(), 1);
        slots.release();

        assert!(slots.try_reserve(1));
        {
            let mut live = LiveThread::new(&slots);
            assert!(!live.hand_over(|| Err(ThreadError::other("no threads left"))));
        }
        assert_eq!(slots.live(), 0);
    }

    #[test]
    fn test_execute_job_counts_outcomes() {
        let counters = JobCounters::new();
        let sink = LogSink;

        let mut ok: BoxedJob = Box::new(ClosureJob::new(|| Ok(())));
        let mut failing: BoxedJob = Box::new(ClosureJob::new(|| Err(ThreadError::other("no"))));
        let mut panicking: BoxedJob = Box::new(ClosureJob::new(|| panic!("Intentional panic for testing")));

        execute_job(&mut ok, &counters, &sink);
        execute_job(&mut failing, &counters, &sink);
        execute_job(&mut panicking, &counters, &sink);

        assert_eq!(counters.get_completed(), 1);
        assert_eq!(counters.get_failed(), 2);
        assert_eq!(counters.get_panicked(), 1);
    }

    #[test]
    fn test_execute_job_reports_panic_to_sink() {
        let reports = Mutex::new(Vec::new());
        let sink = |error: &ThreadError, context: &FailureContext| {
            reports.lock().push((error.clone(), context.job_type.clone()));
        };

        let mut job: BoxedJob = Box::new(ClosureJob::with_name(|| panic!("kaboom"), "Exploding"));
        execute_job(&mut job, &JobCounters::new(), &sink);

        let reports = reports.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].1, "Exploding");
        assert!(matches!(
            &reports[0].0,
            ThreadError::JobPanicked { message, .. } if message == "kaboom"
        ));
    }

    #[test]
    fn test_priority_reset_after_job() {
        let seen = Arc::new(Mutex::new(None));
        let s = Arc::clone(&seen);
        let mut job: BoxedJob = Box::new(PriorityJob::new(ClosureJob::new(move || {
            *s.lock() = Some(ThreadPriority::current());
            Ok(())
        })));

        let after = thread::spawn(move || {
            execute_job(&mut job, &JobCounters::new(), &LogSink);
            ThreadPriority::current()
        })
        .join()
        .expect("thread panicked");

        assert_eq!(*seen.lock(), Some(ThreadPriority::BACKGROUND));
        let expected = if priority::can_restore_normal() {
            ThreadPriority::NORMAL
        } else {
            ThreadPriority::BACKGROUND
        };
        assert_eq!(after, expected);
    }

    #[test]
    fn test_worker_hands_over_before_lowering_for_good() {
        let queue: Arc<dyn JobQueue> = Arc::new(ChannelQueue::unbounded());
        let shared = shared(Arc::clone(&queue), None);
        assert!(shared.slots.try_reserve(1));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let lowered: BoxedJob = Box::new(PriorityJob::new(ClosureJob::new(move || {
            s.lock().push(thread::current().id());
            Ok(())
        })));
        let s = Arc::clone(&seen);
        queue
            .send(Box::new(ClosureJob::new(move || {
                s.lock().push(thread::current().id());
                Ok(())
            })))
            .expect("Failed to send job");
        queue.close();

        let worker = Worker::new(Arc::clone(&shared), Some(lowered));
        thread::spawn(move || worker.run())
            .join()
            .expect("worker panicked");
        shared.threads.join_all().expect("join failed");

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert_eq!(shared.counters.get_completed(), 2);
        assert_eq!(shared.slots.live(), 0);
        // The plain job runs on a fresh thread only when lowering was one-way
        let one_way = priority::is_one_way(ThreadPriority::BACKGROUND);
        assert_eq!(seen[0] != seen[1], one_way);
        assert_eq!(shared.threads.factory().threads_created(), usize::from(one_way));
    }

    #[test]
    fn test_worker_drains_then_exits() {
        let queue: Arc<dyn JobQueue> = Arc::new(ChannelQueue::unbounded());
        let shared = shared(Arc::clone(&queue), None);
        assert!(shared.slots.try_reserve(1));

        for _ in 0..5 {
            queue
                .send(Box::new(ClosureJob::new(|| Ok(()))))
                .expect("Failed to send job");
        }
        queue.close();

        let worker = Worker::new(Arc::clone(&shared), None);
        thread::spawn(move || worker.run())
            .join()
            .expect("worker panicked");

        assert_eq!(shared.counters.get_completed(), 5);
        assert_eq!(shared.slots.live(), 0);
    }

    #[test]
    fn test_idle_worker_retires_above_core() {
        let queue: Arc<dyn JobQueue> = Arc::new(ChannelQueue::unbounded());
        let shared = shared(queue, Some(Duration::from_millis(30)));
        assert!(shared.slots.try_reserve(1));

        let worker = Worker::new(Arc::clone(&shared), Some(Box::new(ClosureJob::new(|| Ok(())))));
        let start = Instant::now();
        thread::spawn(move || worker.run())
            .join()
            .expect("worker panicked");

        assert!(start.elapsed() >= Duration::from_millis(30));
        assert_eq!(shared.counters.get_completed(), 1);
        assert_eq!(shared.slots.live(), 0);
    }
}
