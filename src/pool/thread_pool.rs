//! Thread pool implementation

use crate::core::handle::FutureJob;
use crate::core::{
    BoxedJob, CancellationToken, ClosureJob, Job, PriorityJob, Result, TaskHandle, ThreadError,
    ThreadPriority,
};
use crate::pool::config::{BackpressureStrategy, QueueKind, ThreadPoolConfig};
use crate::pool::factory::{PoolThreads, ThreadFactory};
use crate::pool::worker::{self, JobCounters, PoolStats, ThreadSlots, WorkerShared};
use crate::queue::{ChannelQueue, HandoffQueue, JobQueue, QueueError};
use crate::sink::{ExceptionSink, LogSink};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// A pool of named worker threads.
///
/// Threads are created on demand: a fixed pool spawns a new thread for each
/// submission until it reaches its core size, then queues; a cached pool
/// hands each submission to an idle thread, spawning one when none is idle,
/// and lets threads go after the keep-alive time.
///
/// Failures of jobs executed on the pool are reported to its
/// [`ExceptionSink`]. Failures of work submitted through
/// [`submit`](Self::submit) are also stored in the returned handle.
///
/// # Example
///
/// ```rust
/// use light_threads::prelude::*;
///
/// # fn main() -> Result<()> {
/// let pool = ThreadPool::with_config(ThreadPoolConfig::fixed(2).with_thread_name_prefix("Compute"))?;
///
/// let handle = pool.submit(|| Ok((1..=10).sum::<u32>()))?;
/// assert_eq!(handle.get()?, 55);
///
/// pool.shutdown()?;
/// # Ok(())
/// # }
/// ```
///
/// # Shutdown
///
/// [`shutdown`](Self::shutdown) stops accepting work, lets the threads drain
/// the queue, and joins them. Dropping the pool does the same.
pub struct ThreadPool {
    config: ThreadPoolConfig,
    shared: Arc<WorkerShared>,
    running: AtomicBool,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("config", &self.config)
            .field("name_prefix", &self.name())
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("live_threads", &self.shared.slots.live())
            .finish()
    }
}

impl ThreadPool {
    /// Create a pool that reports failures to the log
    pub fn with_config(config: ThreadPoolConfig) -> Result<Self> {
        Self::with_sink(config, Arc::new(LogSink))
    }

    /// Create a pool that reports failures to `sink`
    pub fn with_sink(config: ThreadPoolConfig, sink: Arc<dyn ExceptionSink>) -> Result<Self> {
        config.validate()?;

        let queue: Arc<dyn JobQueue> = match config.queue {
            QueueKind::Unbounded => Arc::new(ChannelQueue::unbounded()),
            QueueKind::Handoff => Arc::new(HandoffQueue::new()),
        };
        let factory = ThreadFactory::new(&config.thread_name_prefix, Arc::clone(&sink));
        let shared = Arc::new(WorkerShared {
            queue,
            sink,
            counters: JobCounters::new(),
            slots: ThreadSlots::default(),
            threads: PoolThreads::new(factory),
            core_threads: config.core_threads,
            keep_alive: config.keep_alive,
            poll_interval: config.poll_interval,
        });

        log::debug!(
            "created pool '{}' ({} queue, core {}, max {})",
            shared.threads.factory().name_prefix(),
            shared.queue.discipline(),
            config.core_threads,
            config.max_threads
        );

        Ok(Self {
            config,
            shared,
            running: AtomicBool::new(true),
        })
    }

    /// Run a closure on the pool and get a handle to its result
    pub fn submit<F, T>(&self, f: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = FutureJob::new(move |_: &CancellationToken| f());
        self.dispatch(Box::new(job))?;
        Ok(handle)
    }

    /// Like [`submit`](Self::submit), the closure receives the handle's
    /// cancellation token so it can stop early.
    ///
    /// # Example
    ///
    /// ```rust
    /// use light_threads::prelude::*;
    /// use std::time::Duration;
    ///
    /// # fn main() -> Result<()> {
    /// let pool = new_executor(1, "Cancellable")?;
    /// let handle = pool.submit_cancellable(|token| {
    ///     while !token.is_cancelled() {
    ///         std::thread::sleep(Duration::from_millis(5));
    ///     }
    ///     token.check()
    /// })?;
    ///
    /// handle.cancel();
    /// assert!(handle.join().unwrap_err().is_cancellation());
    /// # pool.shutdown()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn submit_cancellable<F, T>(&self, f: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce(&CancellationToken) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = FutureJob::new(f);
        self.dispatch(Box::new(job))?;
        Ok(handle)
    }

    /// Like [`submit`](Self::submit), running at `priority`
    pub fn submit_with_priority<F, T>(&self, f: F, priority: ThreadPriority) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = FutureJob::new(move |_: &CancellationToken| f());
        self.dispatch(Box::new(job.with_priority(priority)))?;
        Ok(handle)
    }

    /// Run a closure on the pool without a handle.
    ///
    /// An error returned by the closure goes to the pool's sink.
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.dispatch(Box::new(ClosureJob::new(f)))
    }

    /// Like [`execute`](Self::execute), running at `priority`
    pub fn execute_with_priority<F>(&self, f: F, priority: ThreadPriority) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.dispatch(Box::new(PriorityJob::with_priority(
            ClosureJob::new(f),
            priority,
        )))
    }

    /// Run a custom [`Job`]
    pub fn execute_job<J: Job + 'static>(&self, job: J) -> Result<()> {
        self.dispatch(Box::new(job))
    }

    fn dispatch(&self, job: BoxedJob) -> Result<()> {
        if !self.is_running() {
            self.shared.counters.increment_rejected();
            return Err(ThreadError::not_running(self.name()));
        }

        let result = match self.config.queue {
            QueueKind::Unbounded => {
                if self.shared.slots.try_reserve(self.config.core_threads) {
                    self.spawn_worker(Some(job))
                } else {
                    self.shared
                        .queue
                        .send(job)
                        .map_err(|e| self.queue_error(e))
                }
            }
            QueueKind::Handoff => match self.shared.queue.try_send(job) {
                Ok(()) => Ok(()),
                Err(QueueError::Full(job)) => {
                    if self.shared.slots.try_reserve(self.config.max_threads) {
                        self.spawn_worker(Some(job))
                    } else {
                        self.apply_backpressure(job)
                    }
                }
                Err(e) => Err(self.queue_error(e)),
            },
        };

        match result {
            Ok(()) => self.shared.counters.increment_submitted(),
            Err(_) => self.shared.counters.increment_rejected(),
        }
        result
    }

    /// Every thread is busy and the pool is at its maximum size.
    ///
    /// While blocked the pool keeps checking for a free slot, since threads
    /// that retire hand no job over.
    fn apply_backpressure(&self, mut job: BoxedJob) -> Result<()> {
        let timeout = match self.config.backpressure_strategy {
            BackpressureStrategy::Block => None,
            BackpressureStrategy::BlockWithTimeout(timeout) => Some(timeout),
            BackpressureStrategy::RejectImmediately => {
                return Err(ThreadError::pool_exhausted(
                    self.shared.slots.live(),
                    self.config.max_threads,
                ))
            }
        };
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        loop {
            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        let timeout = timeout.unwrap_or_default();
                        return Err(ThreadError::submission_timeout(timeout.as_millis() as u64));
                    }
                    remaining.min(self.config.poll_interval)
                }
                None => self.config.poll_interval,
            };

            match self.shared.queue.send_timeout(job, wait) {
                Ok(()) => return Ok(()),
                Err(QueueError::Timeout(returned)) => {
                    if self.shared.slots.try_reserve(self.config.max_threads) {
                        return self.spawn_worker(Some(returned));
                    }
                    job = returned;
                }
                Err(e) => return Err(self.queue_error(e)),
            }
        }
    }

    fn queue_error(&self, error: QueueError) -> ThreadError {
        match error {
            QueueError::Closed(_) | QueueError::Disconnected => {
                ThreadError::not_running(self.name())
            }
            QueueError::Timeout(_) => ThreadError::submission_timeout(0),
            QueueError::Full(_) | QueueError::Empty => {
                ThreadError::pool_exhausted(self.shared.slots.live(), self.config.max_threads)
            }
        }
    }

    /// Start a thread for `first_job`. The caller has reserved its slot.
    fn spawn_worker(&self, first_job: Option<BoxedJob>) -> Result<()> {
        worker::spawn_worker(&self.shared, first_job).map_err(|e| {
            self.shared.slots.release();
            e
        })
    }

    /// Pool configuration
    pub fn config(&self) -> &ThreadPoolConfig {
        &self.config
    }

    /// Prefix shared by the names of this pool's threads
    pub fn name(&self) -> &str {
        self.shared.threads.factory().name_prefix()
    }

    /// Number of threads currently alive
    pub fn num_threads(&self) -> usize {
        self.shared.slots.live()
    }

    /// Check if the pool accepts work
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Jobs waiting for a thread (approximate)
    pub fn queue_size(&self) -> usize {
        self.shared.queue.len()
    }

    /// Snapshot of the pool's counters
    pub fn stats(&self) -> PoolStats {
        let counters = &self.shared.counters;
        PoolStats {
            name: self.name().to_string(),
            core_threads: self.config.core_threads,
            max_threads: self.config.max_threads,
            live_threads: self.shared.slots.live(),
            largest_pool_size: self.shared.slots.largest(),
            threads_created: self.shared.threads.factory().threads_created(),
            queued_jobs: self.shared.queue.len(),
            jobs_submitted: counters.get_submitted(),
            jobs_completed: counters.get_completed(),
            jobs_failed: counters.get_failed(),
            jobs_panicked: counters.get_panicked(),
            jobs_rejected: counters.get_rejected(),
        }
    }

    /// Stop accepting work and wait for the threads to drain the queue.
    ///
    /// Safe to call more than once. When called from one of the pool's own
    /// threads, that thread is not waited for.
    pub fn shutdown(&self) -> Result<()> {
        if self
            .running
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }

        self.shared.queue.close();
        self.shared.threads.join_all()?;

        log::debug!("pool '{}' shut down", self.name());
        Ok(())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.shutdown() {
                log::error!(
                    "failed to shut down pool '{}' during drop: {}",
                    self.name(),
                    e
                );
            }
        }
    }
}
