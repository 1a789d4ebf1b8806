//! Main-thread message loop
//!
//! The dispatch layer only needs three things from a host main loop: post a
//! task now, post it after a delay, and tell whether the caller is on the
//! loop's thread. [`MainThread`] captures exactly that, so a GUI toolkit's
//! event loop can be plugged in. [`Looper`] is the built-in implementation: a
//! deadline-ordered queue drained by the thread that created it.
//!
//! # Example
//!
//! ```rust
//! use light_threads::looper::{Looper, MainThread};
//! use std::time::Duration;
//!
//! # fn main() -> light_threads::Result<()> {
//! let looper = Looper::new();
//! let handle = looper.handle();
//!
//! std::thread::spawn(move || {
//!     let quit = handle.clone();
//!     handle.post(Box::new(|| println!("on the loop thread"))).unwrap();
//!     handle
//!         .post_delayed(Box::new(move || quit.quit()), Duration::from_millis(10))
//!         .unwrap();
//! });
//!
//! looper.run()?;
//! # Ok(())
//! # }
//! ```

use crate::core::{Result, ThreadError};
use crate::queue::DelayQueue;
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// A unit of main-thread work
pub type Runnable = Box<dyn FnOnce() + Send + 'static>;

/// Capabilities the dispatch layer needs from the host main loop
pub trait MainThread: Send + Sync {
    /// Queue `task` behind everything already posted
    fn post(&self, task: Runnable) -> Result<()>;

    /// Queue `task` to run no earlier than `delay` from now
    fn post_delayed(&self, task: Runnable, delay: Duration) -> Result<()>;

    /// Whether the calling thread is the loop's thread
    fn is_current(&self) -> bool;
}

struct LooperShared {
    queue: DelayQueue<Runnable>,
    owner: ThreadId,
    thread_name: String,
}

static MAIN: OnceLock<MainHandle> = OnceLock::new();

/// A message loop bound to the thread that created it.
///
/// Tasks run one at a time on that thread, ordered by due time and then by
/// posting order. A panicking task unwinds out of the driving method, like an
/// uncaught exception on a UI thread.
pub struct Looper {
    shared: Arc<LooperShared>,
}

impl std::fmt::Debug for Looper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Looper")
            .field("thread", &self.shared.thread_name)
            .field("pending", &self.shared.queue.len())
            .finish()
    }
}

impl Default for Looper {
    fn default() -> Self {
        Self::new()
    }
}

impl Looper {
    /// Create a loop owned by the calling thread
    pub fn new() -> Self {
        let current = thread::current();
        Self {
            shared: Arc::new(LooperShared {
                queue: DelayQueue::new(),
                owner: current.id(),
                thread_name: current.name().unwrap_or("unnamed").to_string(),
            }),
        }
    }

    /// Create the process main loop on the calling thread.
    ///
    /// # Errors
    ///
    /// `MainLooperAlreadyPrepared` if a main loop already exists.
    pub fn prepare_main() -> Result<Self> {
        let looper = Self::new();
        let mut fresh = false;
        let handle = MAIN.get_or_init(|| {
            fresh = true;
            looper.handle()
        });
        if !fresh {
            return Err(ThreadError::MainLooperAlreadyPrepared {
                thread_name: handle.shared.thread_name.clone(),
            });
        }
        log::debug!("main looper prepared on thread '{}'", looper.shared.thread_name);
        Ok(looper)
    }

    /// Handle to the process main loop, once [`prepare_main`](Self::prepare_main) ran
    pub fn main_handle() -> Option<MainHandle> {
        MAIN.get().cloned()
    }

    /// Handle other threads use to post to this loop
    pub fn handle(&self) -> MainHandle {
        MainHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    fn check_thread(&self) -> Result<()> {
        if thread::current().id() != self.shared.owner {
            return Err(ThreadError::NotLooperThread);
        }
        Ok(())
    }

    /// Run tasks as they come due until [`MainHandle::quit`] is called.
    pub fn run(&self) -> Result<()> {
        self.check_thread()?;
        while let Some(task) = self.shared.queue.pop() {
            task();
        }
        Ok(())
    }

    /// Run the tasks that are already due, without waiting.
    ///
    /// Tasks posted by those tasks wait for the next call. Returns how many
    /// tasks ran.
    pub fn run_pending(&self) -> Result<usize> {
        self.check_thread()?;
        let budget = self.shared.queue.len();
        let mut ran = 0;
        while ran < budget {
            match self.shared.queue.try_pop() {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        Ok(ran)
    }

    /// Run tasks as they come due until `deadline` or until the loop quits.
    ///
    /// Returns how many tasks ran.
    pub fn run_until(&self, deadline: Instant) -> Result<usize> {
        self.check_thread()?;
        let mut ran = 0;
        while let Some(task) = self.shared.queue.pop_before(deadline) {
            task();
            ran += 1;
        }
        Ok(ran)
    }

    /// Tasks waiting, due or not
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }
}

/// Posting side of a [`Looper`]; cheap to clone and share across threads
#[derive(Clone)]
pub struct MainHandle {
    shared: Arc<LooperShared>,
}

impl std::fmt::Debug for MainHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainHandle")
            .field("thread", &self.shared.thread_name)
            .finish()
    }
}

impl MainHandle {
    /// Stop the loop. Tasks not yet run are dropped and later posts fail.
    pub fn quit(&self) {
        let dropped = self.shared.queue.close().len();
        log::debug!(
            "looper on '{}' quit, {} pending tasks dropped",
            self.shared.thread_name,
            dropped
        );
    }

    /// Whether [`quit`](Self::quit) was called
    pub fn is_quit(&self) -> bool {
        self.shared.queue.is_closed()
    }
}

impl MainThread for MainHandle {
    fn post(&self, task: Runnable) -> Result<()> {
        self.post_delayed(task, Duration::ZERO)
    }

    fn post_delayed(&self, task: Runnable, delay: Duration) -> Result<()> {
        self.shared
            .queue
            .push(task, delay)
            .map_err(|_| ThreadError::MainLoopClosed)
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.shared.owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_post_order_is_fifo() {
        let looper = Looper::new();
        let handle = looper.handle();
        let order = Arc::new(Mutex::new(Vec::new()));

        let h = handle.clone();
        let o = Arc::clone(&order);
        thread::spawn(move || {
            for i in 0..5 {
                let o = Arc::clone(&o);
                h.post(Box::new(move || o.lock().push(i))).unwrap();
            }
        })
        .join()
        .unwrap();

        assert_eq!(looper.run_pending().unwrap(), 5);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_delayed_tasks_by_due_time() {
        let looper = Looper::new();
        let handle = looper.handle();
        let order = Arc::new(Mutex::new(Vec::new()));

        for (name, delay) in [("late", 40), ("early", 10), ("now", 0)] {
            let o = Arc::clone(&order);
            handle
                .post_delayed(Box::new(move || o.lock().push(name)), Duration::from_millis(delay))
                .unwrap();
        }

        let start = Instant::now();
        let ran = looper
            .run_until(Instant::now() + Duration::from_millis(200))
            .unwrap();
        assert_eq!(ran, 3);
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(*order.lock(), vec!["now", "early", "late"]);
    }

    #[test]
    fn test_run_pending_skips_future_tasks() {
        let looper = Looper::new();
        let handle = looper.handle();
        handle
            .post_delayed(Box::new(|| {}), Duration::from_secs(60))
            .unwrap();
        handle.post(Box::new(|| {})).unwrap();

        assert_eq!(looper.run_pending().unwrap(), 1);
        assert_eq!(looper.pending(), 1);
    }

    #[test]
    fn test_run_stops_on_quit() {
        let looper = Looper::new();
        let handle = looper.handle();
        let ran = Arc::new(Mutex::new(0));

        let r = Arc::clone(&ran);
        let h = handle.clone();
        handle
            .post(Box::new(move || {
                *r.lock() += 1;
                h.quit();
            }))
            .unwrap();

        looper.run().unwrap();
        assert_eq!(*ran.lock(), 1);
        assert!(handle.is_quit());
        assert!(matches!(
            handle.post(Box::new(|| {})),
            Err(ThreadError::MainLoopClosed)
        ));
    }

    #[test]
    fn test_only_owner_may_drive() {
        let looper = Arc::new(Looper::new());
        let handle = looper.handle();
        assert!(handle.is_current());

        let l = Arc::clone(&looper);
        let (current, result) = thread::spawn(move || (l.handle().is_current(), l.run_pending()))
            .join()
            .unwrap();
        assert!(!current);
        assert!(matches!(result, Err(ThreadError::NotLooperThread)));
    }
}
