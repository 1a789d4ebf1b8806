//! Work queues behind the pools.
//!
//! - [`ChannelQueue`]: unbounded FIFO queue, used by fixed-size pools
//! - [`HandoffQueue`]: zero-capacity queue that pairs a submission directly
//!   with an idle worker, used by cached pools
//! - [`DelayQueue`]: deadline-ordered queue, used by scheduled pools and the
//!   main loop
//!
//! The first two implement [`JobQueue`] so a [`ThreadPool`](crate::ThreadPool)
//! can drive either one.

mod channel;
mod delay;
mod handoff;

pub use channel::ChannelQueue;
pub use delay::DelayQueue;
pub use handoff::HandoffQueue;

use crate::core::BoxedJob;
use std::time::Duration;

/// Errors returned by queue operations.
///
/// Send failures hand the job back so the caller can decide what to do with it.
#[derive(Debug)]
pub enum QueueError {
    /// No room for the job (no idle worker, for handoff queues)
    Full(BoxedJob),
    /// Queue is closed and not accepting new jobs
    Closed(BoxedJob),
    /// Send timed out
    Timeout(BoxedJob),
    /// Nothing to receive within the timeout
    Empty,
    /// Queue is closed and drained
    Disconnected,
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Full(_) => write!(f, "queue is full"),
            QueueError::Closed(_) => write!(f, "queue is closed"),
            QueueError::Timeout(_) => write!(f, "operation timed out"),
            QueueError::Empty => write!(f, "queue is empty"),
            QueueError::Disconnected => write!(f, "queue is disconnected"),
        }
    }
}

impl std::error::Error for QueueError {}

/// Result type for queue operations.
pub type QueueResult<T> = std::result::Result<T, QueueError>;

/// Trait for the job queue a [`ThreadPool`](crate::ThreadPool) feeds its workers from.
///
/// All implementations must be `Send + Sync` to allow sharing across threads.
pub trait JobQueue: Send + Sync {
    /// Sends a job, blocking until the queue accepts it.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Closed`] if the queue has been closed.
    fn send(&self, job: BoxedJob) -> QueueResult<()>;

    /// Attempts to send a job without blocking.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Full`] if the queue cannot take the job right now
    /// - [`QueueError::Closed`] if the queue has been closed
    fn try_send(&self, job: BoxedJob) -> QueueResult<()>;

    /// Sends a job, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Timeout`] if the operation times out
    /// - [`QueueError::Closed`] if the queue has been closed
    fn send_timeout(&self, job: BoxedJob, timeout: Duration) -> QueueResult<()>;

    /// Receives a job with a timeout.
    ///
    /// # Errors
    ///
    /// - [`QueueError::Empty`] if nothing arrived in time
    /// - [`QueueError::Disconnected`] if the queue is closed and empty
    fn recv_timeout(&self, timeout: Duration) -> QueueResult<BoxedJob>;

    /// Stop accepting jobs. Queued jobs can still be received.
    fn close(&self);

    /// Whether [`close`](Self::close) was called
    fn is_closed(&self) -> bool;

    /// Number of jobs waiting
    fn len(&self) -> usize;

    /// Whether no jobs are waiting
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the queue discipline, for logs and stats
    fn discipline(&self) -> &'static str;
}
