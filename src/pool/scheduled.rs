//! Pool running jobs after a delay or periodically

use crate::core::handle::{Completion, FutureJob, PeriodicJob};
use crate::core::{BoxedJob, CancellationToken, ClosureJob, Job, Result, TaskHandle, ThreadError};
use crate::pool::config::ThreadPoolConfig;
use crate::pool::factory::{PoolThreads, ThreadFactory};
use crate::pool::worker::{
    execute_job, lowers_for_good, JobCounters, LiveThread, PoolStats, ThreadSlots,
};
use crate::queue::DelayQueue;
use crate::sink::{ExceptionSink, LogSink};
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "tracing")]
use tracing::{debug, span, Level};

struct ScheduledEntry {
    job: BoxedJob,
    completion: Option<Arc<dyn Completion>>,
    period: Option<Duration>,
}

impl ScheduledEntry {
    fn is_done(&self) -> bool {
        self.completion.as_ref().is_some_and(|c| c.is_done())
    }

    fn cancel_for_shutdown(&self) {
        if let Some(completion) = &self.completion {
            completion.cancel_for_shutdown();
        }
    }
}

struct ScheduledShared {
    queue: DelayQueue<ScheduledEntry>,
    sink: Arc<dyn ExceptionSink>,
    counters: JobCounters,
    slots: ThreadSlots,
    threads: PoolThreads,
}

/// A fixed-size pool whose jobs become runnable after a delay.
///
/// Jobs due at the same instant run in submission order. Periodic jobs run at
/// a fixed rate: the n-th run is due `initial_delay + n * period` after
/// scheduling. A run never overlaps the previous one; a run that overshoots
/// its period delays the next one. A periodic job stops repeating once it is
/// cancelled, or once a run fails or panics.
///
/// # Example
///
/// ```rust
/// use light_threads::prelude::*;
/// use std::time::Duration;
///
/// # fn main() -> Result<()> {
/// let pool = ScheduledThreadPool::with_config(ThreadPoolConfig::fixed(1))?;
/// let handle = pool.schedule(|| Ok("done"), Duration::from_millis(10))?;
/// assert_eq!(handle.get()?, "done");
/// # pool.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct ScheduledThreadPool {
    config: ThreadPoolConfig,
    shared: Arc<ScheduledShared>,
}

impl std::fmt::Debug for ScheduledThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledThreadPool")
            .field("config", &self.config)
            .field("name_prefix", &self.name())
            .field("scheduled", &self.shared.queue.len())
            .finish()
    }
}

impl ScheduledThreadPool {
    /// Create a pool that reports failures to the log.
    ///
    /// Only `core_threads` and `thread_name_prefix` of the configuration are
    /// used: a scheduled pool keeps exactly its core threads.
    pub fn with_config(config: ThreadPoolConfig) -> Result<Self> {
        Self::with_sink(config, Arc::new(LogSink))
    }

    /// Create a pool that reports failures to `sink`
    pub fn with_sink(config: ThreadPoolConfig, sink: Arc<dyn ExceptionSink>) -> Result<Self> {
        config.validate()?;
        if config.core_threads == 0 {
            return Err(ThreadError::invalid_config(
                "core_threads",
                "A scheduled pool needs at least one core thread",
            ));
        }

        let factory = ThreadFactory::new(&config.thread_name_prefix, Arc::clone(&sink));
        log::debug!(
            "created scheduled pool '{}' ({} threads)",
            factory.name_prefix(),
            config.core_threads
        );

        Ok(Self {
            config,
            shared: Arc::new(ScheduledShared {
                queue: DelayQueue::new(),
                sink,
                counters: JobCounters::new(),
                slots: ThreadSlots::default(),
                threads: PoolThreads::new(factory),
            }),
        })
    }

    /// Run a closure once after `delay` and get a handle to its result
    pub fn schedule<F, T>(&self, f: F, delay: Duration) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (job, handle) = FutureJob::new(move |_: &CancellationToken| f());
        self.enqueue(
            ScheduledEntry {
                job: Box::new(job),
                completion: Some(handle.completion()),
                period: None,
            },
            delay,
        )?;
        Ok(handle)
    }

    /// Run a custom [`Job`] once after `delay`, without a handle
    pub fn schedule_job<J: Job + 'static>(&self, job: J, delay: Duration) -> Result<()> {
        self.enqueue(
            ScheduledEntry {
                job: Box::new(job),
                completion: None,
                period: None,
            },
            delay,
        )
    }

    /// Run a closure every `period`, starting after `initial_delay`.
    ///
    /// The handle never completes successfully: it ends up cancelled, or
    /// failed with the error of the run that stopped the repetition.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `period` is zero.
    pub fn schedule_at_fixed_rate<F>(
        &self,
        f: F,
        initial_delay: Duration,
        period: Duration,
    ) -> Result<TaskHandle<()>>
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        if period.is_zero() {
            return Err(ThreadError::invalid_config(
                "period",
                "Period must be greater than zero",
            ));
        }

        let (job, handle) = PeriodicJob::new(f);
        self.enqueue(
            ScheduledEntry {
                job: Box::new(job),
                completion: Some(handle.completion()),
                period: Some(period),
            },
            initial_delay,
        )?;
        Ok(handle)
    }

    /// Run a closure as soon as a thread is free
    pub fn submit<F, T>(&self, f: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.schedule(f, Duration::ZERO)
    }

    /// Run a closure as soon as a thread is free, without a handle
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.schedule_job(ClosureJob::new(f), Duration::ZERO)
    }

    fn enqueue(&self, entry: ScheduledEntry, delay: Duration) -> Result<()> {
        if self.shared.queue.is_closed() {
            self.shared.counters.increment_rejected();
            return Err(ThreadError::not_running(self.name()));
        }

        if let Err(e) = self.prestart() {
            self.shared.counters.increment_rejected();
            return Err(e);
        }

        match self.shared.queue.push(entry, delay) {
            Ok(()) => {
                self.shared.counters.increment_submitted();
                Ok(())
            }
            Err(_) => {
                self.shared.counters.increment_rejected();
                Err(ThreadError::not_running(self.name()))
            }
        }
    }

    /// Start one more thread if the pool is below its core size
    fn prestart(&self) -> Result<()> {
        if !self.shared.slots.try_reserve(self.config.core_threads) {
            return Ok(());
        }

        spawn_scheduled(&self.shared).map_err(|e| {
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
        !self.shared.queue.is_closed()
    }

    /// Snapshot of the pool's counters
    pub fn stats(&self) -> PoolStats {
        let counters = &self.shared.counters;
        PoolStats {
            name: self.name().to_string(),
            core_threads: self.config.core_threads,
            max_threads: self.config.core_threads,
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

    /// Stop accepting work, cancel everything not yet started, and wait for
    /// running jobs to finish.
    ///
    /// Delayed and periodic jobs are cancelled with reason `Shutdown`.
    pub fn shutdown(&self) -> Result<()> {
        if self.shared.queue.is_closed() {
            return Ok(());
        }

        let pending = self.shared.queue.close();
        let cancelled = pending.len();
        for entry in pending {
            entry.cancel_for_shutdown();
        }

        self.shared.threads.join_all()?;

        log::debug!(
            "scheduled pool '{}' shut down, {} pending jobs cancelled",
            self.name(),
            cancelled
        );
        Ok(())
    }
}

impl Drop for ScheduledThreadPool {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!(
                "failed to shut down scheduled pool '{}' during drop: {}",
                self.name(),
                e
            );
        }
    }
}

/// Start a scheduled pool thread. The caller holds its slot.
fn spawn_scheduled(shared: &Arc<ScheduledShared>) -> Result<()> {
    let body_shared = Arc::clone(shared);
    shared.threads.spawn(None, move || run_scheduled(body_shared))
}

fn run_scheduled(shared: Arc<ScheduledShared>) {
    let mut live = LiveThread::new(&shared.slots);

    #[cfg(feature = "tracing")]
    let worker_span = span!(
        Level::DEBUG,
        "scheduled_worker",
        thread = std::thread::current().name().unwrap_or("unnamed")
    );
    #[cfg(feature = "tracing")]
    let _guard = worker_span.enter();

    while let Some((mut entry, deadline)) = shared.queue.pop_with_deadline() {
        // Cancelled while waiting
        if entry.is_done() {
            continue;
        }

        // The replacement takes over before this thread lowers for good
        let handed_over =
            lowers_for_good(&entry.job) && live.hand_over(|| spawn_scheduled(&shared));

        execute_job(&mut entry.job, &shared.counters, &*shared.sink);

        if let Some(period) = entry.period.filter(|_| !entry.is_done()) {
            // Fixed rate: the successor is due one period after this run was due
            if let Err(entry) = shared.queue.push_at(entry, deadline + period) {
                entry.cancel_for_shutdown();
            }
        }
        if handed_over {
            break;
        }
    }

    #[cfg(feature = "tracing")]
    debug!("scheduled worker shutting down");
}
