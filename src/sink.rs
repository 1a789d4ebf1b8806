//! Centralized reporting of uncaught failures.
//!
//! Every pool built by [`Executors`](crate::Executors) shares one
//! [`ExceptionSink`]. After each job finishes, the pool passes the job and any
//! error it returned to [`after_execute`]; a panicking pool thread is passed
//! to [`uncaught`]. The sink only observes: nothing is retried or rethrown.
//!
//! # Example
//!
//! ```rust
//! use light_threads::prelude::*;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<()> {
//! let sink = Arc::new(|error: &ThreadError, context: &FailureContext| {
//!     eprintln!("{} failed on {}: {}", context.job_type, context.thread_name, error);
//! });
//! let executors = Executors::new().with_sink(sink);
//! let pool = executors.new_executor(1, "Reported")?;
//! # pool.shutdown()?;
//! # Ok(())
//! # }
//! ```

use crate::core::{Job, ThreadError};
use std::fmt;

/// Where an uncaught failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOrigin {
    /// A job failed or panicked
    Task,
    /// A pool thread panicked outside of any job
    Thread,
}

impl fmt::Display for FailureOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureOrigin::Task => write!(f, "task"),
            FailureOrigin::Thread => write!(f, "thread"),
        }
    }
}

/// Context attached to every report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureContext {
    /// Name of the thread the failure happened on
    pub thread_name: String,
    /// Type name of the failed job, or `"thread"` for thread-level failures
    pub job_type: String,
    /// Whether a job or the thread itself failed
    pub origin: FailureOrigin,
}

/// Receiver of uncaught failures from pool threads
pub trait ExceptionSink: Send + Sync {
    /// Record a failure. Must not panic.
    fn report(&self, error: &ThreadError, context: &FailureContext);
}

impl<F> ExceptionSink for F
where
    F: Fn(&ThreadError, &FailureContext) + Send + Sync,
{
    fn report(&self, error: &ThreadError, context: &FailureContext) {
        self(error, context)
    }
}

/// Default sink: logs every failure at error level
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ExceptionSink for LogSink {
    fn report(&self, error: &ThreadError, context: &FailureContext) {
        #[cfg(feature = "tracing")]
        tracing::error!(
            thread = %context.thread_name,
            job_type = %context.job_type,
            origin = %context.origin,
            error = %error,
            "uncaught failure"
        );
        #[cfg(not(feature = "tracing"))]
        log::error!(
            "uncaught {} failure on thread '{}' ({}): {}",
            context.origin,
            context.thread_name,
            context.job_type,
            error
        );
    }
}

fn current_thread_name() -> String {
    std::thread::current()
        .name()
        .unwrap_or("unnamed")
        .to_string()
}

/// Report the outcome of a finished job.
///
/// `error` is what the job's `execute` returned. When it is `None`, the
/// failure stored by the job's own asynchronous result is used instead.
/// Cancellations are never reported. Returns the reported error, if any.
pub fn after_execute(
    sink: &dyn ExceptionSink,
    job: &dyn Job,
    error: Option<ThreadError>,
) -> Option<ThreadError> {
    let error = error.or_else(|| job.failure())?;
    if error.is_cancellation() {
        return None;
    }

    let context = FailureContext {
        thread_name: current_thread_name(),
        job_type: job.job_type().to_string(),
        origin: FailureOrigin::Task,
    };
    sink.report(&error, &context);
    Some(error)
}

/// Report a pool thread that died from a panic outside of any job
pub fn uncaught(sink: &dyn ExceptionSink, thread_name: &str, error: &ThreadError) {
    let context = FailureContext {
        thread_name: thread_name.to_string(),
        job_type: "thread".to_string(),
        origin: FailureOrigin::Thread,
    };
    sink.report(error, &context);
}
