//! Job trait and related types

use crate::core::error::Result;
use crate::core::priority::ThreadPriority;
use crate::core::ThreadError;
use std::any::Any;
use std::fmt;

/// A trait representing a unit of work to be executed by a pool
pub trait Job: Send {
    /// Execute the job
    ///
    /// # Errors
    ///
    /// Returns an error if the job execution fails
    fn execute(&mut self) -> Result<()>;

    /// Get the job's type name for debugging and failure reports
    fn job_type(&self) -> &str {
        "Job"
    }

    /// Explicit thread priority this job wants to run at.
    ///
    /// The thread factory consults this when a new thread is created for the job.
    fn priority(&self) -> Option<ThreadPriority> {
        None
    }

    /// Failure stored by an asynchronous result after execution.
    ///
    /// Jobs that capture their own failures (such as the jobs behind a
    /// [`TaskHandle`](crate::TaskHandle)) return `Ok(())` from [`execute`](Self::execute)
    /// and expose the captured error here. Cancellation is never returned.
    fn failure(&self) -> Option<ThreadError> {
        None
    }
}

impl fmt::Debug for dyn Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job({})", self.job_type())
    }
}

/// A boxed job that can be sent across threads
pub type BoxedJob = Box<dyn Job>;

/// Helper to create a job from a closure
pub struct ClosureJob<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    closure: Option<F>,
    name: String,
}

impl<F> ClosureJob<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    /// Create a new closure job
    pub fn new(closure: F) -> Self {
        Self {
            closure: Some(closure),
            name: "ClosureJob".to_string(),
        }
    }

    /// Create a new closure job with a custom name
    pub fn with_name<S: Into<String>>(closure: F, name: S) -> Self {
        Self {
            closure: Some(closure),
            name: name.into(),
        }
    }
}

impl<F> Job for ClosureJob<F>
where
    F: FnOnce() -> Result<()> + Send,
{
    fn execute(&mut self) -> Result<()> {
        match self.closure.take() {
            Some(closure) => closure(),
            None => Err(ThreadError::other(
                "ClosureJob already executed - cannot execute twice",
            )),
        }
    }

    fn job_type(&self) -> &str {
        &self.name
    }
}

/// Extract a readable message from a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
