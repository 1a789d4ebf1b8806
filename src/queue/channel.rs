//! Unbounded FIFO queue using crossbeam channels.

use super::{JobQueue, QueueError, QueueResult};
use crate::core::BoxedJob;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::RwLock;
use std::time::Duration;

/// An unbounded FIFO queue using crossbeam channels.
///
/// Sends never block. This is the queue of fixed-size pools.
///
/// Once [`close`](JobQueue::close) returns, every send that succeeded is in
/// the channel, so a receiver that sees the queue closed and empty has
/// nothing left to miss.
pub struct ChannelQueue {
    sender: Sender<BoxedJob>,
    receiver: Receiver<BoxedJob>,
    // Held for reading across each send, so close waits for them
    closed: RwLock<bool>,
}

impl ChannelQueue {
    /// Creates a new unbounded channel queue.
    pub fn unbounded() -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            sender,
            receiver,
            closed: RwLock::new(false),
        }
    }
}

impl JobQueue for ChannelQueue {
    fn send(&self, job: BoxedJob) -> QueueResult<()> {
        let closed = self.closed.read();
        if *closed {
            return Err(QueueError::Closed(job));
        }
        self.sender.send(job).map_err(|e| QueueError::Closed(e.0))
    }

    fn try_send(&self, job: BoxedJob) -> QueueResult<()> {
        self.send(job)
    }

    fn send_timeout(&self, job: BoxedJob, _timeout: Duration) -> QueueResult<()> {
        self.send(job)
    }

    fn recv_timeout(&self, timeout: Duration) -> QueueResult<BoxedJob> {
        if self.is_closed() && self.receiver.is_empty() {
            return Err(QueueError::Disconnected);
        }

        match self.receiver.recv_timeout(timeout) {
            Ok(job) => Ok(job),
            Err(channel::RecvTimeoutError::Timeout) => {
                if self.is_closed() && self.receiver.is_empty() {
                    Err(QueueError::Disconnected)
                } else {
                    Err(QueueError::Empty)
                }
            }
            Err(channel::RecvTimeoutError::Disconnected) => Err(QueueError::Disconnected),
        }
    }

    fn close(&self) {
        *self.closed.write() = true;
    }

    fn is_closed(&self) -> bool {
        *self.closed.read()
    }

    fn len(&self) -> usize {
        self.receiver.len()
    }

    fn discipline(&self) -> &'static str {
        "unbounded"
    }
}
