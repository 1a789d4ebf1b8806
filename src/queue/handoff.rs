//! Zero-capacity handoff queue.

use super::{JobQueue, QueueError, QueueResult};
use crate::core::BoxedJob;
use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Blocking sends wake up this often to notice [`JobQueue::close`].
const SEND_POLL: Duration = Duration::from_millis(100);

/// A queue with no storage: a send only succeeds when a worker is blocked in
/// [`recv_timeout`](JobQueue::recv_timeout) at that moment.
///
/// Backed by a crossbeam rendezvous channel (`bounded(0)`). A blocking
/// [`send`](JobQueue::send) only waits for a receiver; a pool that may also
/// start one should send with a timeout and check for a free slot in between.
///
/// ```rust
/// use light_threads::queue::{HandoffQueue, JobQueue, QueueError};
/// use light_threads::ClosureJob;
///
/// let queue = HandoffQueue::new();
/// // Nobody is waiting to receive, so the job cannot be handed off
/// let job = Box::new(ClosureJob::new(|| Ok(())));
/// assert!(matches!(queue.try_send(job), Err(QueueError::Full(_))));
/// ```
pub struct HandoffQueue {
    sender: Sender<BoxedJob>,
    receiver: Receiver<BoxedJob>,
    closed: AtomicBool,
}

impl HandoffQueue {
    /// Creates a new handoff queue.
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(0);
        Self {
            sender,
            receiver,
            closed: AtomicBool::new(false),
        }
    }

    fn send_until(&self, mut job: BoxedJob, deadline: Option<Instant>) -> QueueResult<()> {
        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(QueueError::Closed(job));
            }

            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(QueueError::Timeout(job));
                    }
                    remaining.min(SEND_POLL)
                }
                None => SEND_POLL,
            };

            match self.sender.send_timeout(job, wait) {
                Ok(()) => return Ok(()),
                Err(channel::SendTimeoutError::Timeout(returned)) => job = returned,
                Err(channel::SendTimeoutError::Disconnected(returned)) => {
                    return Err(QueueError::Closed(returned))
                }
            }
        }
    }
}

impl Default for HandoffQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl JobQueue for HandoffQueue {
    fn send(&self, job: BoxedJob) -> QueueResult<()> {
        self.send_until(job, None)
    }

    fn try_send(&self, job: BoxedJob) -> QueueResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed(job));
        }
        self.sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => QueueError::Full(job),
            TrySendError::Disconnected(job) => QueueError::Closed(job),
        })
    }

    fn send_timeout(&self, job: BoxedJob, timeout: Duration) -> QueueResult<()> {
        self.send_until(job, Some(Instant::now() + timeout))
    }

    fn recv_timeout(&self, timeout: Duration) -> QueueResult<BoxedJob> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Disconnected);
        }

        match self.receiver.recv_timeout(timeout) {
            Ok(job) => Ok(job),
            Err(channel::RecvTimeoutError::Timeout) => {
                if self.closed.load(Ordering::SeqCst) {
                    Err(QueueError::Disconnected)
                } else {
                    Err(QueueError::Empty)
                }
            }
            Err(channel::RecvTimeoutError::Disconnected) => Err(QueueError::Disconnected),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn len(&self) -> usize {
        0
    }

    fn discipline(&self) -> &'static str {
        "handoff"
    }
}
