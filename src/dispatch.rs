//! Background and foreground dispatch helpers
//!
//! [`LightThreads`] is the process-scoped context behind the helpers: it owns
//! the shared background pool, the shared scheduled pool, and the main-thread
//! target. Build one at startup and pass it around, or [`install`] it once and
//! reach it through [`LightThreads::global`].
//!
//! [`install`]: LightThreads::install

use crate::core::{Result, TaskHandle, ThreadError};
use crate::looper::MainThread;
use crate::pool::{Executors, ScheduledThreadPool, ThreadPool};
use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Name prefix of the shared background pool's threads
pub const BACKGROUND_POOL_NAME: &str = "BackgroundExecutor";

/// Name prefix of the shared scheduled pool's threads
pub const SCHEDULED_POOL_NAME: &str = "ScheduledExecutor";

/// Size of each shared pool, as a multiple of the hardware parallelism
pub const DEFAULT_MULTIPLIER: usize = 4;

static GLOBAL: OnceLock<LightThreads> = OnceLock::new();

/// Process-scoped dispatch context.
///
/// # Example
///
/// ```rust
/// use light_threads::prelude::*;
/// use std::sync::Arc;
///
/// # fn main() -> Result<()> {
/// let looper = Looper::new();
/// let threads = LightThreads::new(Arc::new(looper.handle()))?;
///
/// // Not on the main thread from here: runs inline
/// std::thread::scope(|s| {
///     s.spawn(|| {
///         let handle = threads.run_in_background(|| Ok(())).unwrap();
///         assert!(handle.is_none());
///     });
/// });
///
/// // On the main thread: goes to the background pool
/// let handle = threads.run_in_background(|| Ok(()))?;
/// handle.expect("queued").join()?;
/// # threads.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct LightThreads {
    background: ThreadPool,
    scheduled: ScheduledThreadPool,
    main: Arc<dyn MainThread>,
}

impl std::fmt::Debug for LightThreads {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightThreads")
            .field("background", &self.background.name())
            .field("scheduled", &self.scheduled.name())
            .finish()
    }
}

/// Builder for [`LightThreads`]
pub struct LightThreadsBuilder {
    main: Arc<dyn MainThread>,
    executors: Executors,
    background: Option<ThreadPool>,
    scheduled: Option<ScheduledThreadPool>,
}

impl LightThreadsBuilder {
    /// Factory used for the pools not supplied explicitly
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_executors(mut self, executors: Executors) -> Self {
        self.executors = executors;
        self
    }

    /// Use `pool` as the shared background pool
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_background(mut self, pool: ThreadPool) -> Self {
        self.background = Some(pool);
        self
    }

    /// Use `pool` as the shared scheduled pool
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_scheduled(mut self, pool: ScheduledThreadPool) -> Self {
        self.scheduled = Some(pool);
        self
    }

    /// Create the missing pools and the context
    pub fn build(self) -> Result<LightThreads> {
        let background = match self.background {
            Some(pool) => pool,
            None => self
                .executors
                .new_executor(DEFAULT_MULTIPLIER, BACKGROUND_POOL_NAME)?,
        };
        let scheduled = match self.scheduled {
            Some(pool) => pool,
            None => self
                .executors
                .new_scheduled_executor(DEFAULT_MULTIPLIER, SCHEDULED_POOL_NAME)?,
        };

        Ok(LightThreads {
            background,
            scheduled,
            main: self.main,
        })
    }
}

impl LightThreads {
    /// Context with the default pools, dispatching foreground work to `main`
    pub fn new(main: Arc<dyn MainThread>) -> Result<Self> {
        Self::builder(main).build()
    }

    /// Start configuring a context
    pub fn builder(main: Arc<dyn MainThread>) -> LightThreadsBuilder {
        LightThreadsBuilder {
            main,
            executors: Executors::new(),
            background: None,
            scheduled: None,
        }
    }

    /// Make this the process-wide context.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if a context was already installed; the rejected
    /// context is shut down.
    pub fn install(self) -> Result<&'static LightThreads> {
        GLOBAL.set(self).map_err(|_| {
            ThreadError::invalid_config("global", "A LightThreads context is already installed")
        })?;
        GLOBAL
            .get()
            .ok_or_else(|| ThreadError::other("LightThreads context vanished after install"))
    }

    /// The context passed to [`install`](Self::install), if any
    pub fn global() -> Option<&'static LightThreads> {
        GLOBAL.get()
    }

    /// Whether the caller is on the main thread
    pub fn is_on_main_thread(&self) -> bool {
        self.main.is_current()
    }

    /// Same as [`run_in_background_with`](Self::run_in_background_with) with
    /// `immediately` set.
    pub fn run_in_background<F>(&self, task: F) -> Result<Option<TaskHandle<()>>>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.run_in_background_with(task, true)
    }

    /// Run `task` off the main thread.
    ///
    /// With `immediately` set and the caller already off the main thread, the
    /// task runs inline: the call returns `Ok(None)` once it finished and
    /// its error, if any, is returned directly. Otherwise it goes to the
    /// shared background pool and the handle is returned.
    pub fn run_in_background_with<F>(
        &self,
        task: F,
        immediately: bool,
    ) -> Result<Option<TaskHandle<()>>>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        if immediately && !self.is_on_main_thread() {
            task()?;
            return Ok(None);
        }
        self.background.submit(task).map(Some)
    }

    /// Run `task` on the scheduled pool after `delay`
    pub fn run_in_background_delayed<F>(&self, task: F, delay: Duration) -> Result<TaskHandle<()>>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        self.scheduled.schedule(task, delay)
    }

    /// Run `task` on the scheduled pool after `delay`, keeping its result
    pub fn schedule<F, T>(&self, task: F, delay: Duration) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.scheduled.schedule(task, delay)
    }

    /// Run `task` on the scheduled pool every `period` after `delay`.
    ///
    /// Runs never overlap; one that overshoots its period pushes the next one
    /// back.
    pub fn schedule_at_fixed_rate<F>(
        &self,
        task: F,
        delay: Duration,
        period: Duration,
    ) -> Result<TaskHandle<()>>
    where
        F: FnMut() -> Result<()> + Send + 'static,
    {
        self.scheduled.schedule_at_fixed_rate(task, delay, period)
    }

    /// Run `task` on the main thread.
    ///
    /// On the main thread it runs before this returns; from any other thread
    /// it is queued behind earlier foreground posts.
    ///
    /// # Errors
    ///
    /// Whatever the main thread returns when it refuses the post, such as
    /// `MainLoopClosed`.
    pub fn run_in_foreground<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_on_main_thread() {
            task();
            return Ok(());
        }
        self.main.post(Box::new(task))
    }

    /// Queue `task` on the main thread to run no earlier than `delay` from
    /// now. Never runs inline, even on the main thread.
    pub fn run_in_foreground_delayed<F>(&self, task: F, delay: Duration) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.main.post_delayed(Box::new(task), delay)
    }

    /// Post `task` to the main thread every `period` after `delay`.
    ///
    /// The scheduled pool keeps the rate; each tick is posted to the main
    /// thread. The repetition stops when the handle is cancelled or the main
    /// loop stops accepting posts.
    pub fn run_in_foreground_at_fixed_rate<F>(
        &self,
        task: F,
        delay: Duration,
        period: Duration,
    ) -> Result<TaskHandle<()>>
    where
        F: FnMut() + Send + 'static,
    {
        let task = Arc::new(Mutex::new(task));
        let main = Arc::clone(&self.main);
        self.scheduled.schedule_at_fixed_rate(
            move || {
                let task = Arc::clone(&task);
                main.post(Box::new(move || {
                    let mut task = task.lock();
                    (*task)()
                }))
            },
            delay,
            period,
        )
    }

    /// The shared background pool
    pub fn background(&self) -> &ThreadPool {
        &self.background
    }

    /// The shared scheduled pool
    pub fn scheduled(&self) -> &ScheduledThreadPool {
        &self.scheduled
    }

    /// The main-thread target
    pub fn main_thread(&self) -> &Arc<dyn MainThread> {
        &self.main
    }

    /// Shut down both shared pools
    pub fn shutdown(&self) -> Result<()> {
        self.scheduled.shutdown()?;
        self.background.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::looper::Looper;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn context(looper: &Looper) -> LightThreads {
        LightThreads::builder(Arc::new(looper.handle()))
            .with_executors(Executors::new().with_parallelism(1))
            .build()
            .expect("Failed to build context")
    }

    #[test]
    fn test_default_pool_names() {
        let looper = Looper::new();
        let threads = context(&looper);
        assert!(threads.background().name().starts_with("BackgroundExecutor-"));
        assert!(threads.scheduled().name().starts_with("ScheduledExecutor-"));
        assert_eq!(threads.background().config().core_threads, 4);
        threads.shutdown().expect("Failed to shutdown");
    }

    #[test]
    fn test_foreground_inline_on_main_thread() {
        let looper = Looper::new();
        let threads = context(&looper);
        let ran = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&ran);
        threads
            .run_in_foreground(move || {
                r.fetch_add(1, Ordering::SeqCst);
            })
            .expect("Failed to run");

        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(looper.pending(), 0);
        threads.shutdown().expect("Failed to shutdown");
    }

    #[test]
    fn test_delayed_foreground_always_queued() {
        let looper = Looper::new();
        let threads = context(&looper);
        let ran = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&ran);
        threads
            .run_in_foreground_delayed(
                move || {
                    r.fetch_add(1, Ordering::SeqCst);
                },
                Duration::ZERO,
            )
            .expect("Failed to post");

        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(looper.run_pending().expect("run failed"), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        threads.shutdown().expect("Failed to shutdown");
    }

    #[test]
    fn test_background_from_main_thread_is_queued() {
        let looper = Looper::new();
        let threads = context(&looper);
        let caller = thread::current().id();

        let handle = threads
            .run_in_background(move || {
                assert_ne!(thread::current().id(), caller);
                Ok(())
            })
            .expect("Failed to submit")
            .expect("expected a handle");

        handle.join().expect("task failed");
        threads.shutdown().expect("Failed to shutdown");
    }

    #[test]
    fn test_background_not_immediately_always_queued() {
        let looper = Looper::new();
        let threads = Arc::new(context(&looper));

        let t = Arc::clone(&threads);
        let handle = thread::spawn(move || t.run_in_background_with(|| Ok(()), false))
            .join()
            .expect("caller panicked")
            .expect("Failed to submit");

        assert!(handle.is_some());
        threads.shutdown().expect("Failed to shutdown");
    }

    #[test]
    fn test_inline_background_propagates_error() {
        let looper = Looper::new();
        let threads = Arc::new(context(&looper));

        let t = Arc::clone(&threads);
        let result = thread::spawn(move || {
            t.run_in_background(|| Err(ThreadError::other("inline failure")))
        })
        .join()
        .expect("caller panicked");

        assert_eq!(result.unwrap_err(), ThreadError::other("inline failure"));
        assert_eq!(threads.background().stats().jobs_submitted, 0);
        threads.shutdown().expect("Failed to shutdown");
    }

    #[test]
    fn test_foreground_at_fixed_rate_posts_ticks() {
        let looper = Looper::new();
        let threads = context(&looper);
        let ticks = Arc::new(AtomicUsize::new(0));

        let t = Arc::clone(&ticks);
        let handle = threads
            .run_in_foreground_at_fixed_rate(
                move || {
                    t.fetch_add(1, Ordering::SeqCst);
                },
                Duration::ZERO,
                Duration::from_millis(20),
            )
            .expect("Failed to schedule");

        looper
            .run_until(std::time::Instant::now() + Duration::from_millis(150))
            .expect("run failed");
        handle.cancel();

        assert!(ticks.load(Ordering::SeqCst) >= 3);
        threads.shutdown().expect("Failed to shutdown");
    }
}
