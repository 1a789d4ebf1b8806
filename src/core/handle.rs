//! Handles to submitted work
//!
//! A [`TaskHandle`] is the submitter's view of a job running on a pool: it can
//! be awaited, queried for the result or failure, and cancelled. The pool side
//! drives the same shared state through the jobs defined here.

use crate::core::cancellation::{CancellationReason, CancellationToken};
use crate::core::job::panic_message;
use crate::core::priority::{PriorityGuard, ThreadPriority};
use crate::core::{Job, Result, ThreadError};
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

fn next_job_id() -> u64 {
    NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed)
}

enum TaskState<T> {
    Pending,
    Running,
    Succeeded(Option<T>),
    Failed(ThreadError),
    Cancelled,
}

impl<T> TaskState<T> {
    fn is_done(&self) -> bool {
        !matches!(self, TaskState::Pending | TaskState::Running)
    }

    fn name(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Succeeded(_) => "succeeded",
            TaskState::Failed(_) => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

struct HandleInner<T> {
    job_id: u64,
    state: Mutex<TaskState<T>>,
    done: Condvar,
    token: CancellationToken,
}

impl<T> HandleInner<T> {
    fn cancelled_error(&self) -> ThreadError {
        let reason = self
            .token
            .reason()
            .unwrap_or(CancellationReason::Manual)
            .to_string();
        ThreadError::cancelled(self.job_id.to_string(), reason)
    }

    fn cancel_with_reason(&self, reason: CancellationReason) -> bool {
        {
            let mut state = self.state.lock();
            if state.is_done() {
                return false;
            }
            *state = TaskState::Cancelled;
        }
        self.done.notify_all();
        self.token.cancel_with_reason(reason);
        true
    }
}

/// Type-erased completion state, used by queues that hold jobs of mixed result types
pub(crate) trait Completion: Send + Sync {
    fn is_done(&self) -> bool;

    fn cancel_for_shutdown(&self) -> bool;
}

impl<T: Send> Completion for HandleInner<T> {
    fn is_done(&self) -> bool {
        self.state.lock().is_done()
    }

    fn cancel_for_shutdown(&self) -> bool {
        self.cancel_with_reason(CancellationReason::Shutdown)
    }
}

/// A cancellable, awaitable reference to submitted work
///
/// Clones share the same underlying state.
///
/// # Example
///
/// ```rust
/// use light_threads::prelude::*;
///
/// # fn main() -> Result<()> {
/// let pool = new_executor(1, "Example")?;
/// let handle = pool.submit(|| Ok(6 * 7))?;
/// assert_eq!(handle.get()?, 42);
/// # pool.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct TaskHandle<T> {
    inner: Arc<HandleInner<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("job_id", &self.inner.job_id)
            .field("state", &self.inner.state.lock().name())
            .finish()
    }
}

impl<T> TaskHandle<T> {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(HandleInner {
                job_id: next_job_id(),
                state: Mutex::new(TaskState::Pending),
                done: Condvar::new(),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Get the unique job ID
    pub fn job_id(&self) -> u64 {
        self.inner.job_id
    }

    /// Token the running job can poll to honour cancellation
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Cancel the job.
    ///
    /// A job that has not started yet will never run. A running job has its
    /// token cancelled and its eventual result discarded. Returns `false` if
    /// the job had already finished.
    pub fn cancel(&self) -> bool {
        self.inner.cancel_with_reason(CancellationReason::Manual)
    }

    /// Whether the job was cancelled before it finished
    pub fn is_cancelled(&self) -> bool {
        matches!(*self.inner.state.lock(), TaskState::Cancelled)
    }

    /// Whether the job finished, failed or was cancelled
    pub fn is_done(&self) -> bool {
        self.inner.state.lock().is_done()
    }

    /// Block until the job is done
    pub fn wait(&self) {
        let mut state = self.inner.state.lock();
        while !state.is_done() {
            self.inner.done.wait(&mut state);
        }
    }

    /// Block until the job is done or the timeout expires.
    ///
    /// Returns whether the job is done.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.inner.state.lock();
        while !state.is_done() {
            if self.inner.done.wait_until(&mut state, deadline).timed_out() {
                return state.is_done();
            }
        }
        true
    }

    /// Stored failure of a finished job, if it failed.
    ///
    /// Cancellation is not a failure and yields `None`.
    pub fn failure(&self) -> Option<ThreadError> {
        match &*self.inner.state.lock() {
            TaskState::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }

    /// Wait for the job and move its value out.
    ///
    /// # Errors
    ///
    /// The job's own error, `Cancelled`, or `ResultTaken` if a clone of this
    /// handle already took the value.
    pub fn join(self) -> Result<T> {
        self.wait();
        let mut state = self.inner.state.lock();
        match &mut *state {
            TaskState::Succeeded(value) => value
                .take()
                .ok_or_else(|| ThreadError::result_taken(self.inner.job_id.to_string())),
            TaskState::Failed(e) => Err(e.clone()),
            _ => Err(self.inner.cancelled_error()),
        }
    }

    // Pool side

    /// Move from pending to running; `false` if the job was cancelled first
    pub(crate) fn begin(&self) -> bool {
        let mut state = self.inner.state.lock();
        match *state {
            TaskState::Pending => {
                *state = TaskState::Running;
                true
            }
            _ => false,
        }
    }

    /// Record the outcome of a run unless the job was cancelled meanwhile
    pub(crate) fn complete(&self, outcome: Result<T>) {
        {
            let mut state = self.inner.state.lock();
            if !matches!(*state, TaskState::Running) {
                return;
            }
            *state = match outcome {
                Ok(value) => TaskState::Succeeded(Some(value)),
                Err(e) => TaskState::Failed(e),
            };
        }
        self.inner.done.notify_all();
    }

    /// Return a successfully finished periodic run to pending
    pub(crate) fn rearm(&self) -> bool {
        let mut state = self.inner.state.lock();
        match *state {
            TaskState::Running => {
                *state = TaskState::Pending;
                true
            }
            _ => false,
        }
    }
}

impl<T: Clone> TaskHandle<T> {
    /// Wait for the job and return a copy of its value
    pub fn get(&self) -> Result<T> {
        self.wait();
        self.current_outcome()
    }

    /// Wait up to `timeout` for the job and return a copy of its value
    ///
    /// # Errors
    ///
    /// `JobTimeout` if the job is still running when the timeout expires.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T> {
        if !self.wait_timeout(timeout) {
            return Err(ThreadError::job_timeout(
                self.inner.job_id.to_string(),
                timeout.as_millis() as u64,
            ));
        }
        self.current_outcome()
    }

    fn current_outcome(&self) -> Result<T> {
        match &*self.inner.state.lock() {
            TaskState::Succeeded(Some(value)) => Ok(value.clone()),
            TaskState::Succeeded(None) => {
                Err(ThreadError::result_taken(self.inner.job_id.to_string()))
            }
            TaskState::Failed(e) => Err(e.clone()),
            _ => Err(self.inner.cancelled_error()),
        }
    }
}

impl<T: Send + 'static> TaskHandle<T> {
    pub(crate) fn completion(&self) -> Arc<dyn Completion> {
        Arc::clone(&self.inner) as Arc<dyn Completion>
    }
}

/// One-shot job whose outcome is captured by a [`TaskHandle`]
pub(crate) struct FutureJob<T, F> {
    handle: TaskHandle<T>,
    closure: Option<F>,
    priority: Option<ThreadPriority>,
}

impl<T, F> FutureJob<T, F>
where
    T: Send,
    F: FnOnce(&CancellationToken) -> Result<T> + Send,
{
    pub(crate) fn new(closure: F) -> (Self, TaskHandle<T>) {
        let handle = TaskHandle::new();
        let job = Self {
            handle: handle.clone(),
            closure: Some(closure),
            priority: None,
        };
        (job, handle)
    }

    pub(crate) fn with_priority(mut self, priority: ThreadPriority) -> Self {
        self.priority = Some(priority);
        self
    }
}

impl<T, F> Job for FutureJob<T, F>
where
    T: Send,
    F: FnOnce(&CancellationToken) -> Result<T> + Send,
{
    fn execute(&mut self) -> Result<()> {
        let closure = self
            .closure
            .take()
            .ok_or_else(|| ThreadError::other("FutureJob already executed - cannot execute twice"))?;

        if !self.handle.begin() {
            return Ok(());
        }

        let _guard = self.priority.map(PriorityGuard::enter);
        let token = self.handle.token().clone();
        let outcome = catch_unwind(AssertUnwindSafe(|| closure(&token))).unwrap_or_else(|payload| {
            Err(ThreadError::job_panicked(
                self.handle.job_id().to_string(),
                panic_message(&*payload),
            ))
        });
        self.handle.complete(outcome);
        Ok(())
    }

    fn job_type(&self) -> &str {
        "FutureJob"
    }

    fn priority(&self) -> Option<ThreadPriority> {
        self.priority
    }

    fn failure(&self) -> Option<ThreadError> {
        self.handle.failure()
    }
}

/// Repeating job; stays pending between runs until cancelled or failed
pub(crate) struct PeriodicJob<F> {
    handle: TaskHandle<()>,
    closure: F,
}

impl<F> PeriodicJob<F>
where
    F: FnMut() -> Result<()> + Send,
{
    pub(crate) fn new(closure: F) -> (Self, TaskHandle<()>) {
        let handle = TaskHandle::new();
        let job = Self {
            handle: handle.clone(),
            closure,
        };
        (job, handle)
    }
}

impl<F> Job for PeriodicJob<F>
where
    F: FnMut() -> Result<()> + Send,
{
    fn execute(&mut self) -> Result<()> {
        if !self.handle.begin() {
            return Ok(());
        }

        let closure = &mut self.closure;
        match catch_unwind(AssertUnwindSafe(closure)) {
            Ok(Ok(())) => {
                self.handle.rearm();
            }
            Ok(Err(e)) => self.handle.complete(Err(e)),
            Err(payload) => self.handle.complete(Err(ThreadError::job_panicked(
                self.handle.job_id().to_string(),
                panic_message(&*payload),
            ))),
        }
        Ok(())
    }

    fn job_type(&self) -> &str {
        "PeriodicJob"
    }

    fn failure(&self) -> Option<ThreadError> {
        self.handle.failure()
    }
}
