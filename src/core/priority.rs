//! Thread priority hints
//!
//! Priorities are niceness values: lower numbers are more favourable, the
//! range is `-20..=19`. On Linux the value is applied to the calling OS thread
//! with `setpriority`; elsewhere it is only recorded per thread. Either way
//! [`ThreadPriority::current`] reports it.
//!
//! Raising a thread's priority (lowering its niceness) usually needs extra
//! privileges. A refused change is logged and otherwise ignored, since the
//! priority is only a scheduling hint, and [`ThreadPriority::current`] keeps
//! reporting the priority the thread actually runs at.
//!
//! Without those privileges a thread that lowers its priority can never get
//! back to [`ThreadPriority::NORMAL`]. Pool threads therefore hand their place
//! to a fresh thread before running such a job, and exit after it.

use crate::core::{Job, Result, ThreadError};
use std::cell::Cell;
use std::fmt;

/// Scheduling priority of a thread, expressed as a niceness value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadPriority(i32);

impl ThreadPriority {
    /// Least favourable priority
    pub const LOWEST: ThreadPriority = ThreadPriority(19);
    /// Background work that should not disturb interactive threads
    pub const BACKGROUND: ThreadPriority = ThreadPriority(10);
    /// Default priority of every pool thread
    pub const NORMAL: ThreadPriority = ThreadPriority(0);
    /// Work the user is actively waiting on
    pub const FOREGROUND: ThreadPriority = ThreadPriority(-2);
    /// Work feeding the display
    pub const DISPLAY: ThreadPriority = ThreadPriority(-4);
    /// Latency critical display work
    pub const URGENT_DISPLAY: ThreadPriority = ThreadPriority(-8);
    /// Most favourable priority
    pub const HIGHEST: ThreadPriority = ThreadPriority(-20);

    /// Create a priority from a raw niceness value
    pub fn new(value: i32) -> Result<Self> {
        if !(Self::HIGHEST.0..=Self::LOWEST.0).contains(&value) {
            return Err(ThreadError::priority(
                value,
                format!(
                    "niceness must be within {}..={}",
                    Self::HIGHEST.0,
                    Self::LOWEST.0
                ),
            ));
        }
        Ok(Self(value))
    }

    /// Raw niceness value
    pub fn value(&self) -> i32 {
        self.0
    }

    /// Priority the calling thread runs at
    pub fn current() -> ThreadPriority {
        CURRENT.with(|current| match current.get() {
            Some(priority) => priority,
            None => {
                let priority = os_priority().unwrap_or(ThreadPriority::NORMAL);
                current.set(Some(priority));
                priority
            }
        })
    }

    /// Apply this priority to the calling thread.
    ///
    /// [`current`](Self::current) only changes if the OS accepts the request.
    pub fn apply_to_current(self) -> Result<()> {
        apply_os(self)?;
        CURRENT.with(|current| current.set(Some(self)));
        Ok(())
    }
}

impl Default for ThreadPriority {
    fn default() -> Self {
        Self::NORMAL
    }
}

impl fmt::Display for ThreadPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

thread_local! {
    // Read from the OS on first use: threads inherit their creator's niceness
    static CURRENT: Cell<Option<ThreadPriority>> = const { Cell::new(None) };
}

#[cfg(target_os = "linux")]
fn apply_os(priority: ThreadPriority) -> Result<()> {
    // SAFETY: gettid has no preconditions and setpriority on a tid only
    // affects that single thread.
    let rc = unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, priority.0)
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(ThreadError::priority(
            priority.0,
            std::io::Error::last_os_error().to_string(),
        ))
    }
}

#[cfg(target_os = "linux")]
fn os_priority() -> Option<ThreadPriority> {
    // SAFETY: as above. errno is cleared first since -1 is a valid niceness.
    unsafe {
        let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
        *libc::__errno_location() = 0;
        let value = libc::getpriority(libc::PRIO_PROCESS, tid);
        if value == -1 && *libc::__errno_location() != 0 {
            return None;
        }
        Some(ThreadPriority(value))
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_os(_priority: ThreadPriority) -> Result<()> {
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn os_priority() -> Option<ThreadPriority> {
    None
}

/// Whether a thread that lowered its priority may return to NORMAL.
///
/// Checked once per process on a scratch thread, so no pool thread is left
/// at a lowered priority by the check itself.
#[cfg(target_os = "linux")]
pub(crate) fn can_restore_normal() -> bool {
    use std::sync::OnceLock;

    static CAN_RESTORE: OnceLock<bool> = OnceLock::new();
    *CAN_RESTORE.get_or_init(|| {
        std::thread::Builder::new()
            .name("priority-check".to_string())
            .spawn(|| {
                apply_os(ThreadPriority(ThreadPriority::NORMAL.0 + 1)).is_ok()
                    && apply_os(ThreadPriority::NORMAL).is_ok()
            })
            .ok()
            .and_then(|handle| handle.join().ok())
            .unwrap_or(false)
    })
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn can_restore_normal() -> bool {
    true
}

/// Whether running at `priority` would leave a thread unable to get back to
/// [`ThreadPriority::NORMAL`]
pub(crate) fn is_one_way(priority: ThreadPriority) -> bool {
    priority.0 > ThreadPriority::NORMAL.0 && !can_restore_normal()
}

/// Apply a priority to the calling thread, logging instead of failing
pub(crate) fn apply_hint(priority: ThreadPriority) {
    if let Err(e) = priority.apply_to_current() {
        log::debug!(
            "thread '{}' kept its OS priority: {}",
            std::thread::current().name().unwrap_or("unnamed"),
            e
        );
    }
}

/// Put the calling thread back to [`ThreadPriority::NORMAL`] if a job changed it
pub(crate) fn reset_current() {
    let current = ThreadPriority::current();
    if current != ThreadPriority::NORMAL && !is_one_way(current) {
        apply_hint(ThreadPriority::NORMAL);
    }
}

/// Runs with a priority for as long as it lives, then restores the previous one
#[derive(Debug)]
pub struct PriorityGuard {
    previous: ThreadPriority,
}

impl PriorityGuard {
    /// Switch the calling thread to `priority`
    pub fn enter(priority: ThreadPriority) -> Self {
        let previous = ThreadPriority::current();
        apply_hint(priority);
        Self { previous }
    }
}

impl Drop for PriorityGuard {
    fn drop(&mut self) {
        if ThreadPriority::current() != self.previous {
            apply_hint(self.previous);
        }
    }
}

/// A job that runs its inner job at an explicit thread priority
///
/// The default priority is [`ThreadPriority::BACKGROUND`], meant for CPU-bound
/// work that should yield to interactive threads.
///
/// ```rust
/// use light_threads::prelude::*;
///
/// # fn main() -> Result<()> {
/// let pool = new_executor(1, "Crunch")?;
/// pool.execute_job(PriorityJob::new(ClosureJob::new(|| {
///     assert_eq!(ThreadPriority::current(), ThreadPriority::BACKGROUND);
///     Ok(())
/// })))?;
/// # pool.shutdown()?;
/// # Ok(())
/// # }
/// ```
pub struct PriorityJob<J: Job> {
    inner: J,
    priority: ThreadPriority,
}

impl<J: Job> PriorityJob<J> {
    /// Wrap a job to run at background priority
    pub fn new(inner: J) -> Self {
        Self::with_priority(inner, ThreadPriority::BACKGROUND)
    }

    /// Wrap a job to run at a specific priority
    pub fn with_priority(inner: J, priority: ThreadPriority) -> Self {
        Self { inner, priority }
    }
}

impl<J: Job> Job for PriorityJob<J> {
    fn execute(&mut self) -> Result<()> {
        let _guard = PriorityGuard::enter(self.priority);
        self.inner.execute()
    }

    fn job_type(&self) -> &str {
        self.inner.job_type()
    }

    fn priority(&self) -> Option<ThreadPriority> {
        Some(self.priority)
    }

    fn failure(&self) -> Option<ThreadError> {
        self.inner.failure()
    }
}
