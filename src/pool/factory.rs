//! Named thread creation for pools

use crate::core::job::panic_message;
use crate::core::priority::{self, ThreadPriority};
use crate::core::{Result, ThreadError};
use crate::sink::{self, ExceptionSink};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Sequence shared by every factory in the process, starting at 1
static POOL_NUMBER: AtomicUsize = AtomicUsize::new(1);

/// Creates the threads of one pool.
///
/// Threads are named `<pool name>-<pool number>-thread<thread number>`: the
/// pool number is unique per factory across the process, the thread number
/// counts from 1 within the factory. Every thread starts at the priority of
/// the job it is created for, or [`ThreadPriority::NORMAL`]. A priority the
/// thread could not come back from is left for the job to apply itself. A
/// panic that escapes the thread body goes to the exception sink instead of
/// being lost.
pub struct ThreadFactory {
    name_prefix: String,
    pool_number: usize,
    thread_number: AtomicUsize,
    sink: Arc<dyn ExceptionSink>,
}

impl std::fmt::Debug for ThreadFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadFactory")
            .field("name_prefix", &self.name_prefix)
            .field("threads_created", &self.threads_created())
            .finish()
    }
}

impl ThreadFactory {
    /// Create a factory for the pool called `pool_name`
    pub fn new(pool_name: &str, sink: Arc<dyn ExceptionSink>) -> Self {
        let pool_number = POOL_NUMBER.fetch_add(1, Ordering::Relaxed);
        Self {
            name_prefix: format!("{}-{}-thread", pool_name, pool_number),
            pool_number,
            thread_number: AtomicUsize::new(1),
            sink,
        }
    }

    /// Process-wide number of this factory's pool
    pub fn pool_number(&self) -> usize {
        self.pool_number
    }

    /// Common prefix of every thread name, e.g. `Background-3-thread`
    pub fn name_prefix(&self) -> &str {
        &self.name_prefix
    }

    /// Number of threads created so far
    pub fn threads_created(&self) -> usize {
        self.thread_number.load(Ordering::Relaxed) - 1
    }

    /// Sink receiving failures from this factory's threads
    pub fn sink(&self) -> &Arc<dyn ExceptionSink> {
        &self.sink
    }

    fn next_thread_name(&self) -> String {
        let n = self.thread_number.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.name_prefix, n)
    }

    /// Spawn a named thread running `body`.
    ///
    /// `priority` is the explicit priority of the job the thread is created
    /// for, if any.
    pub fn spawn<F>(&self, priority: Option<ThreadPriority>, body: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = self.next_thread_name();
        let thread_name = name.clone();
        let sink = Arc::clone(&self.sink);
        let priority = priority
            .filter(|p| !priority::is_one_way(*p))
            .unwrap_or(ThreadPriority::NORMAL);

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                priority::apply_hint(priority);
                if let Err(payload) = catch_unwind(AssertUnwindSafe(body)) {
                    let error = ThreadError::worker_panic(&thread_name, panic_message(&*payload));
                    sink::uncaught(&*sink, &thread_name, &error);
                }
            })
            .map_err(|e| ThreadError::spawn(&name, e.to_string()))?;

        log::debug!("spawned thread '{}'", name);
        Ok(handle)
    }
}

/// The threads of one pool: their factory and the handles shutdown joins
#[derive(Debug)]
pub(crate) struct PoolThreads {
    factory: ThreadFactory,
    // None once joined; no thread may start after that
    handles: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl PoolThreads {
    pub(crate) fn new(factory: ThreadFactory) -> Self {
        Self {
            factory,
            handles: Mutex::new(Some(Vec::new())),
        }
    }

    pub(crate) fn factory(&self) -> &ThreadFactory {
        &self.factory
    }

    /// Start a pool thread, unless the pool has already been joined
    pub(crate) fn spawn<F>(&self, priority: Option<ThreadPriority>, body: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut handles = self.handles.lock();
        let Some(handles) = handles.as_mut() else {
            return Err(ThreadError::not_running(self.factory.name_prefix()));
        };
        let handle = self.factory.spawn(priority, body)?;
        handles.retain(|t| !t.is_finished());
        handles.push(handle);
        Ok(())
    }

    /// Refuse further threads and join the started ones, skipping the
    /// calling thread
    pub(crate) fn join_all(&self) -> Result<()> {
        let handles = self.handles.lock().take().unwrap_or_default();
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            let name = handle
                .thread()
                .name()
                .unwrap_or(self.factory.name_prefix())
                .to_string();
            handle
                .join()
                .map_err(|_| ThreadError::worker_panic(name, "thread panicked during shutdown"))?;
        }
        Ok(())
    }
}
