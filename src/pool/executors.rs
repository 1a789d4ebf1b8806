//! Factory for the standard pool shapes

use crate::core::{Result, ThreadError};
use crate::pool::config::ThreadPoolConfig;
use crate::pool::scheduled::ScheduledThreadPool;
use crate::pool::thread_pool::ThreadPool;
use crate::sink::{ExceptionSink, LogSink};
use std::sync::Arc;

/// Builds fixed, cached, and scheduled pools that share one exception sink.
///
/// Pool sizes are multiples of the available hardware parallelism.
///
/// # Example
///
/// ```rust
/// use light_threads::prelude::*;
///
/// # fn main() -> Result<()> {
/// let executors = Executors::new().with_parallelism(4);
///
/// let pool = executors.new_executor(2, "Decoder")?;
/// assert_eq!(pool.config().core_threads, 8);
///
/// assert!(executors.new_executor(2, "  ").is_err());
/// # pool.shutdown()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Executors {
    parallelism: usize,
    sink: Arc<dyn ExceptionSink>,
}

impl std::fmt::Debug for Executors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executors")
            .field("parallelism", &self.parallelism)
            .finish()
    }
}

impl Default for Executors {
    fn default() -> Self {
        Self::new()
    }
}

impl Executors {
    /// Factory sized by the number of CPUs, logging failures
    pub fn new() -> Self {
        Self {
            parallelism: num_cpus::get(),
            sink: Arc::new(LogSink),
        }
    }

    /// Override the hardware parallelism pool sizes are multiplied by
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    /// Report failures of every pool built from now on to `sink`
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_sink(mut self, sink: Arc<dyn ExceptionSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Hardware parallelism pool sizes are multiplied by
    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Sink shared by the pools this factory builds
    pub fn sink(&self) -> &Arc<dyn ExceptionSink> {
        &self.sink
    }

    /// Fixed-size pool of `parallelism * multiplier` threads with an
    /// unbounded FIFO queue. Threads never time out.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `name` is blank or the size comes out as zero.
    pub fn new_executor(&self, multiplier: usize, name: &str) -> Result<ThreadPool> {
        let config = ThreadPoolConfig::fixed(self.scaled(multiplier))
            .with_thread_name_prefix(checked_name(name)?);
        ThreadPool::with_sink(config, Arc::clone(&self.sink))
    }

    /// Pool with no core threads and at most `max_size`, handing every
    /// submission directly to an idle thread. Threads idle for 60 seconds
    /// are retired; a submission made while all `max_size` threads are busy
    /// waits for one to free up.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `name` is blank or `max_size` is zero.
    pub fn new_cache_executor(&self, name: &str, max_size: usize) -> Result<ThreadPool> {
        let config = ThreadPoolConfig::cached(max_size).with_thread_name_prefix(checked_name(name)?);
        ThreadPool::with_sink(config, Arc::clone(&self.sink))
    }

    /// Scheduled pool sized like [`new_executor`](Self::new_executor)
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if `name` is blank or the size comes out as zero.
    pub fn new_scheduled_executor(
        &self,
        multiplier: usize,
        name: &str,
    ) -> Result<ScheduledThreadPool> {
        let config = ThreadPoolConfig::fixed(self.scaled(multiplier))
            .with_thread_name_prefix(checked_name(name)?);
        ScheduledThreadPool::with_sink(config, Arc::clone(&self.sink))
    }

    fn scaled(&self, multiplier: usize) -> usize {
        self.parallelism.saturating_mul(multiplier)
    }
}

fn checked_name(name: &str) -> Result<&str> {
    if name.trim().is_empty() {
        return Err(ThreadError::invalid_config("name", "Name must not be empty"));
    }
    Ok(name)
}

/// [`Executors::new_executor`] with the default factory
pub fn new_executor(multiplier: usize, name: &str) -> Result<ThreadPool> {
    Executors::new().new_executor(multiplier, name)
}

/// [`Executors::new_cache_executor`] with the default factory
pub fn new_cache_executor(name: &str, max_size: usize) -> Result<ThreadPool> {
    Executors::new().new_cache_executor(name, max_size)
}

/// [`Executors::new_scheduled_executor`] with the default factory
pub fn new_scheduled_executor(multiplier: usize, name: &str) -> Result<ScheduledThreadPool> {
    Executors::new().new_scheduled_executor(multiplier, name)
}
