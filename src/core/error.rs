//! Error types for the thread system

/// Result type for thread system operations
pub type Result<T> = std::result::Result<T, ThreadError>;

/// Errors that can occur in the thread system
///
/// The type is `Clone` so that a failure stored in a [`TaskHandle`](crate::TaskHandle)
/// can be handed to every waiter and to the exception sink.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ThreadError {
    /// Invalid configuration with parameter
    #[error("Invalid configuration for '{parameter}': {message}")]
    InvalidConfig {
        /// Configuration parameter name
        parameter: String,
        /// Error message
        message: String,
    },

    /// Thread pool no longer accepts work
    #[error("Thread pool '{pool_name}' is not running")]
    NotRunning {
        /// Name of the thread pool
        pool_name: String,
    },

    /// Failed to spawn a pool thread
    #[error("Failed to spawn thread '{thread_name}': {message}")]
    SpawnError {
        /// Name the thread would have carried
        thread_name: String,
        /// Error message
        message: String,
    },

    /// Handoff pool at its maximum size with no idle thread
    #[error("Thread pool exhausted: {active}/{total} threads busy")]
    PoolExhausted {
        /// Number of live threads
        active: usize,
        /// Maximum number of threads
        total: usize,
    },

    /// Job submission timed out waiting for an idle thread
    #[error("Job submission timed out after {timeout_ms}ms")]
    SubmissionTimeout {
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// Job panicked while running
    #[error("Job panicked (job_id: {job_id}): {message}")]
    JobPanicked {
        /// ID of the job
        job_id: String,
        /// Panic message
        message: String,
    },

    /// A pool thread panicked outside of any job
    #[error("Worker thread '{thread_name}' panicked: {message}")]
    WorkerPanic {
        /// Name of the panicked thread
        thread_name: String,
        /// Panic message
        message: String,
    },

    /// Job was cancelled with reason
    #[error("Job cancelled (job_id: {job_id}): {reason}")]
    Cancelled {
        /// ID of the cancelled job
        job_id: String,
        /// Reason for cancellation
        reason: String,
    },

    /// Waiting on a job timed out
    #[error("Job timeout after {timeout_ms}ms (job_id: {job_id})")]
    JobTimeout {
        /// ID of the timed out job
        job_id: String,
        /// Timeout duration in milliseconds
        timeout_ms: u64,
    },

    /// The job's value was already moved out of its handle
    #[error("Result of job {job_id} was already taken")]
    ResultTaken {
        /// ID of the job
        job_id: String,
    },

    /// The main loop has quit and no longer accepts work
    #[error("Main loop is closed")]
    MainLoopClosed,

    /// A main looper was already designated for this process
    #[error("Main looper already prepared on thread '{thread_name}'")]
    MainLooperAlreadyPrepared {
        /// Name of the thread that owns the main looper
        thread_name: String,
    },

    /// A looper operation was invoked from a thread that does not own it
    #[error("Looper can only be driven from its own thread")]
    NotLooperThread,

    /// Thread priority could not be applied
    #[error("Cannot apply thread priority {value}: {message}")]
    Priority {
        /// Requested niceness value
        value: i32,
        /// Error message
        message: String,
    },

    /// General error
    #[error("{0}")]
    Other(String),
}

impl ThreadError {
    /// Create an invalid config error
    pub fn invalid_config(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        ThreadError::InvalidConfig {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a not running error
    pub fn not_running(pool_name: impl Into<String>) -> Self {
        ThreadError::NotRunning {
            pool_name: pool_name.into(),
        }
    }

    /// Create a spawn error
    pub fn spawn(thread_name: impl Into<String>, message: impl Into<String>) -> Self {
        ThreadError::SpawnError {
            thread_name: thread_name.into(),
            message: message.into(),
        }
    }

    /// Create a pool exhausted error
    pub fn pool_exhausted(active: usize, total: usize) -> Self {
        ThreadError::PoolExhausted { active, total }
    }

    /// Create a submission timeout error
    pub fn submission_timeout(timeout_ms: u64) -> Self {
        ThreadError::SubmissionTimeout { timeout_ms }
    }

    /// Create a job panicked error
    pub fn job_panicked(job_id: impl Into<String>, message: impl Into<String>) -> Self {
        ThreadError::JobPanicked {
            job_id: job_id.into(),
            message: message.into(),
        }
    }

    /// Create a worker panic error
    pub fn worker_panic(thread_name: impl Into<String>, message: impl Into<String>) -> Self {
        ThreadError::WorkerPanic {
            thread_name: thread_name.into(),
            message: message.into(),
        }
    }

    /// Create a cancelled error
    pub fn cancelled(job_id: impl Into<String>, reason: impl Into<String>) -> Self {
        ThreadError::Cancelled {
            job_id: job_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a job timeout error
    pub fn job_timeout(job_id: impl Into<String>, timeout_ms: u64) -> Self {
        ThreadError::JobTimeout {
            job_id: job_id.into(),
            timeout_ms,
        }
    }

    /// Create a result taken error
    pub fn result_taken(job_id: impl Into<String>) -> Self {
        ThreadError::ResultTaken {
            job_id: job_id.into(),
        }
    }

    /// Create a priority error
    pub fn priority(value: i32, message: impl Into<String>) -> Self {
        ThreadError::Priority {
            value,
            message: message.into(),
        }
    }

    /// Create a generic error
    pub fn other<S: Into<String>>(msg: S) -> Self {
        ThreadError::Other(msg.into())
    }

    /// Whether this error only records a cancellation.
    ///
    /// Cancellations are an expected outcome and never reach the exception sink.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, ThreadError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ThreadError::invalid_config("name", "must not be blank");
        assert!(matches!(err, ThreadError::InvalidConfig { .. }));

        let err = ThreadError::pool_exhausted(2, 2);
        assert!(matches!(err, ThreadError::PoolExhausted { .. }));

        let err = ThreadError::job_panicked("job_123", "disk full");
        assert!(matches!(err, ThreadError::JobPanicked { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = ThreadError::invalid_config("name", "thread name must not be blank");
        assert_eq!(
            err.to_string(),
            "Invalid configuration for 'name': thread name must not be blank"
        );

        let err = ThreadError::job_timeout("job_456", 5000);
        assert_eq!(
            err.to_string(),
            "Job timeout after 5000ms (job_id: job_456)"
        );

        let err = ThreadError::pool_exhausted(8, 8);
        assert_eq!(err.to_string(), "Thread pool exhausted: 8/8 threads busy");
    }

    #[test]
    fn test_cancellation_classification() {
        assert!(ThreadError::cancelled("7", "user").is_cancellation());
        assert!(!ThreadError::job_panicked("7", "boom").is_cancellation());
        assert!(!ThreadError::other("x").is_cancellation());
    }
}
