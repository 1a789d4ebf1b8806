//! Deadline-ordered blocking queue.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

struct Delayed<T> {
    deadline: Instant,
    seq: u64,
    item: T,
}

// Earliest deadline first, then submission order. Reversed because
// BinaryHeap is a max-heap.
impl<T> Ord for Delayed<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Delayed<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Delayed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<T> Eq for Delayed<T> {}

struct DelayState<T> {
    heap: BinaryHeap<Delayed<T>>,
    next_seq: u64,
    closed: bool,
}

/// A blocking queue that releases items once their deadline has passed.
///
/// Items are released earliest deadline first; items with equal deadlines
/// come out in the order they were pushed. Deadlines for relative delays are
/// taken under the queue lock, so items pushed with the same delay are
/// released in push order even across threads.
///
/// ```rust
/// use light_threads::queue::DelayQueue;
/// use std::time::Duration;
///
/// let queue = DelayQueue::new();
/// queue.push("later", Duration::from_millis(20)).unwrap();
/// queue.push("now", Duration::ZERO).unwrap();
///
/// assert_eq!(queue.pop(), Some("now"));
/// assert_eq!(queue.pop(), Some("later"));
/// ```
pub struct DelayQueue<T> {
    state: Mutex<DelayState<T>>,
    available: Condvar,
}

impl<T> DelayQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DelayState {
                heap: BinaryHeap::new(),
                next_seq: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Queue an item to be released after `delay`.
    ///
    /// Hands the item back if the queue is closed.
    pub fn push(&self, item: T, delay: Duration) -> Result<(), T> {
        let mut state = self.state.lock();
        let deadline = Instant::now() + delay;
        Self::insert(&mut state, item, deadline)?;
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Queue an item to be released at `deadline`.
    ///
    /// Hands the item back if the queue is closed.
    pub fn push_at(&self, item: T, deadline: Instant) -> Result<(), T> {
        let mut state = self.state.lock();
        Self::insert(&mut state, item, deadline)?;
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    fn insert(state: &mut DelayState<T>, item: T, deadline: Instant) -> Result<(), T> {
        if state.closed {
            return Err(item);
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(Delayed {
            deadline,
            seq,
            item,
        });
        Ok(())
    }

    /// Block until an item is due. Returns `None` once the queue is closed.
    pub fn pop(&self) -> Option<T> {
        self.pop_until(None).map(|(item, _)| item)
    }

    /// Like [`pop`](Self::pop), also returning the item's deadline
    pub fn pop_with_deadline(&self) -> Option<(T, Instant)> {
        self.pop_until(None)
    }

    /// Block until an item is due or `deadline` passes
    pub fn pop_before(&self, deadline: Instant) -> Option<T> {
        self.pop_until(Some(deadline)).map(|(item, _)| item)
    }

    /// Take the head item if it is already due
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        if state.closed {
            return None;
        }
        match state.heap.peek() {
            Some(head) if head.deadline <= Instant::now() => state.heap.pop().map(|d| d.item),
            _ => None,
        }
    }

    fn pop_until(&self, limit: Option<Instant>) -> Option<(T, Instant)> {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return None;
            }

            let now = Instant::now();
            let head_deadline = state.heap.peek().map(|head| head.deadline);
            if head_deadline.is_some_and(|deadline| deadline <= now) {
                let due = state.heap.pop()?;
                let more = !state.heap.is_empty();
                drop(state);
                if more {
                    self.available.notify_one();
                }
                return Some((due.item, due.deadline));
            }

            let wake_at = match (head_deadline, limit) {
                (Some(head), Some(limit)) => Some(head.min(limit)),
                (head, limit) => head.or(limit),
            };

            if let Some(limit) = limit {
                if now >= limit {
                    return None;
                }
            }

            match wake_at {
                Some(at) => {
                    self.available.wait_until(&mut state, at);
                }
                None => self.available.wait(&mut state),
            }
        }
    }

    /// Close the queue and return everything still waiting, in release order.
    ///
    /// Blocked consumers return `None`; later pushes are refused.
    pub fn close(&self) -> Vec<T> {
        let mut state = self.state.lock();
        state.closed = true;
        let mut pending = std::mem::take(&mut state.heap).into_sorted_vec();
        drop(state);
        self.available.notify_all();
        // into_sorted_vec is ascending by Ord, which is latest first here
        pending.reverse();
        pending.into_iter().map(|d| d.item).collect()
    }

    /// Whether [`close`](Self::close) was called
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of waiting items, due or not
    pub fn len(&self) -> usize {
        self.state.lock().heap.len()
    }

    /// Whether no items are waiting
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for DelayQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_equal_deadlines_keep_push_order() {
        let queue = DelayQueue::new();
        let deadline = Instant::now();
        for i in 0..10 {
            queue.push_at(i, deadline).unwrap();
        }
        let popped: Vec<_> = (0..10).filter_map(|_| queue.try_pop()).collect();
        assert_eq!(popped, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_earliest_deadline_first() {
        let queue = DelayQueue::new();
        queue.push("c", Duration::from_millis(30)).unwrap();
        queue.push("a", Duration::from_millis(10)).unwrap();
        queue.push("b", Duration::from_millis(20)).unwrap();

        let start = Instant::now();
        assert_eq!(queue.pop(), Some("a"));
        assert_eq!(queue.pop(), Some("b"));
        assert_eq!(queue.pop(), Some("c"));
        assert!(start.elapsed() >= Duration::from_millis(25));
    }

    #[test]
    fn test_not_released_early() {
        let queue = DelayQueue::new();
        queue.push(1, Duration::from_millis(50)).unwrap();
        assert_eq!(queue.try_pop(), None);
        assert_eq!(
            queue.pop_before(Instant::now() + Duration::from_millis(10)),
            None
        );
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_new_earlier_item_wakes_consumer() {
        let queue = Arc::new(DelayQueue::new());
        queue.push("slow", Duration::from_secs(10)).unwrap();

        let q = Arc::clone(&queue);
        let consumer = thread::spawn(move || q.pop());

        thread::sleep(Duration::from_millis(20));
        queue.push("fast", Duration::ZERO).unwrap();

        assert_eq!(consumer.join().unwrap(), Some("fast"));
    }

    #[test]
    fn test_close_wakes_consumers_and_returns_pending() {
        let queue = Arc::new(DelayQueue::new());
        queue.push(2, Duration::from_secs(20)).unwrap();
        queue.push(1, Duration::from_secs(10)).unwrap();

        let q = Arc::clone(&queue);
        let consumer = thread::spawn(move || q.pop());
        thread::sleep(Duration::from_millis(20));

        assert_eq!(queue.close(), vec![1, 2]);
        assert_eq!(consumer.join().unwrap(), None);
        assert!(queue.is_closed());
        assert_eq!(queue.push(3, Duration::ZERO), Err(3));
    }
}
