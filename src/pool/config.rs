//! Thread pool configuration

use crate::core::{Result, ThreadError};
use std::time::Duration;

/// Idle time after which a cached pool retires a thread
pub const CACHED_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// How submitted jobs reach worker threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Unbounded FIFO queue; submissions never wait
    Unbounded,
    /// Zero-capacity queue; a submission is handed directly to an idle worker
    Handoff,
}

/// What a handoff pool does when every thread is busy and it is at max size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackpressureStrategy {
    /// Wait until a thread becomes free
    #[default]
    Block,
    /// Wait up to the given duration, then fail with `SubmissionTimeout`
    BlockWithTimeout(Duration),
    /// Fail right away with `PoolExhausted`
    RejectImmediately,
}

/// Configuration for thread pool
#[derive(Debug, Clone)]
pub struct ThreadPoolConfig {
    /// Threads kept alive even when idle
    pub core_threads: usize,
    /// Upper bound on live threads
    pub max_threads: usize,
    /// Idle time before a thread above `core_threads` retires (None = never)
    pub keep_alive: Option<Duration>,
    /// Queue discipline
    pub queue: QueueKind,
    /// Thread name prefix; threads are named `<prefix>-<pool>-thread<n>`
    pub thread_name_prefix: String,
    /// Worker poll interval for checking shutdown and idle time.
    /// Default: 100ms
    pub poll_interval: Duration,
    /// Submission behaviour when a handoff pool is saturated
    pub backpressure_strategy: BackpressureStrategy,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self::fixed(num_cpus::get())
    }
}

impl ThreadPoolConfig {
    /// Fixed-size pool: `threads` core threads, no idle timeout, unbounded FIFO queue
    #[must_use]
    pub fn fixed(threads: usize) -> Self {
        Self {
            core_threads: threads,
            max_threads: threads,
            keep_alive: None,
            queue: QueueKind::Unbounded,
            thread_name_prefix: "pool".to_string(),
            poll_interval: Duration::from_millis(100),
            backpressure_strategy: BackpressureStrategy::Block,
        }
    }

    /// Cached pool: no core threads, up to `max_threads`, 60 second keep-alive, handoff queue
    #[must_use]
    pub fn cached(max_threads: usize) -> Self {
        Self {
            core_threads: 0,
            max_threads,
            keep_alive: Some(CACHED_KEEP_ALIVE),
            queue: QueueKind::Handoff,
            ..Self::fixed(max_threads)
        }
    }

    /// Set thread name prefix
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Set the idle time after which threads above the core size retire
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    /// Set the worker poll interval.
    ///
    /// Shorter intervals make shutdown and idle retirement more responsive at
    /// the cost of more wakeups.
    ///
    /// # Panics
    ///
    /// Panics if interval is zero.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        assert!(!interval.is_zero(), "poll interval must be non-zero");
        self.poll_interval = interval;
        self
    }

    /// Set the backpressure strategy for handoff queues.
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn with_backpressure_strategy(mut self, strategy: BackpressureStrategy) -> Self {
        self.backpressure_strategy = strategy;
        self
    }

    /// Reject submissions immediately when no thread is free
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn reject_when_full(self) -> Self {
        self.with_backpressure_strategy(BackpressureStrategy::RejectImmediately)
    }

    /// Wait at most `timeout` for a free thread
    #[must_use = "builder methods return a new value and do not modify the original"]
    pub fn block_with_timeout(self, timeout: Duration) -> Self {
        self.with_backpressure_strategy(BackpressureStrategy::BlockWithTimeout(timeout))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.thread_name_prefix.trim().is_empty() {
            return Err(ThreadError::invalid_config(
                "thread_name_prefix",
                "Thread name must not be blank",
            ));
        }
        if self.max_threads == 0 {
            return Err(ThreadError::invalid_config(
                "max_threads",
                "Maximum number of threads must be greater than 0",
            ));
        }
        if self.core_threads > self.max_threads {
            return Err(ThreadError::invalid_config(
                "core_threads",
                format!(
                    "Core threads ({}) cannot exceed max threads ({})",
                    self.core_threads, self.max_threads
                ),
            ));
        }
        if self.queue == QueueKind::Unbounded && self.core_threads == 0 {
            return Err(ThreadError::invalid_config(
                "core_threads",
                "An unbounded queue needs at least one core thread",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_preset() {
        let config = ThreadPoolConfig::fixed(8).with_thread_name_prefix("Fixed");
        assert_eq!(config.core_threads, 8);
        assert_eq!(config.max_threads, 8);
        assert_eq!(config.keep_alive, None);
        assert_eq!(config.queue, QueueKind::Unbounded);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cached_preset() {
        let config = ThreadPoolConfig::cached(2).with_thread_name_prefix("Cached");
        assert_eq!(config.core_threads, 0);
        assert_eq!(config.max_threads, 2);
        assert_eq!(config.keep_alive, Some(Duration::from_secs(60)));
        assert_eq!(config.queue, QueueKind::Handoff);
        assert_eq!(config.backpressure_strategy, BackpressureStrategy::Block);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_blank_prefix() {
        for prefix in ["", "   ", "\t\n"] {
            let err = ThreadPoolConfig::fixed(1)
                .with_thread_name_prefix(prefix)
                .validate()
                .unwrap_err();
            assert!(matches!(err, ThreadError::InvalidConfig { ref parameter, .. } if parameter == "thread_name_prefix"));
        }
    }

    #[test]
    fn test_validate_sizes() {
        assert!(ThreadPoolConfig::fixed(0).validate().is_err());
        assert!(ThreadPoolConfig::cached(0).validate().is_err());

        let mut config = ThreadPoolConfig::fixed(2);
        config.core_threads = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    #[should_panic(expected = "poll interval must be non-zero")]
    fn test_zero_poll_interval_panics() {
        let _ = ThreadPoolConfig::fixed(1).with_poll_interval(Duration::ZERO);
    }

    #[test]
    fn test_backpressure_helpers() {
        let config = ThreadPoolConfig::cached(1).reject_when_full();
        assert_eq!(
            config.backpressure_strategy,
            BackpressureStrategy::RejectImmediately
        );

        let config = ThreadPoolConfig::cached(1).block_with_timeout(Duration::from_secs(1));
        assert_eq!(
            config.backpressure_strategy,
            BackpressureStrategy::BlockWithTimeout(Duration::from_secs(1))
        );
    }
}
