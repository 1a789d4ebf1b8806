//! Cooperative cancellation signal
//!
//! Rust threads cannot be interrupted from the outside. A running task that
//! wants to stop early when its [`TaskHandle`](crate::TaskHandle) is cancelled
//! checks the [`CancellationToken`] it was given.
//!
//! # Example
//!
//! ```rust
//! use light_threads::CancellationToken;
//!
//! let token = CancellationToken::new();
//! let seen_by_task = token.clone();
//!
//! token.cancel();
//! assert!(seen_by_task.is_cancelled());
//! assert!(seen_by_task.check().is_err());
//! ```

use crate::core::Result;
use crate::ThreadError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Reason for cancellation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CancellationReason {
    /// Explicitly cancelled via `cancel()` or a handle
    Manual,
    /// The owning pool shut down before the job ran
    Shutdown,
}

impl std::fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationReason::Manual => write!(f, "manually cancelled"),
            CancellationReason::Shutdown => write!(f, "pool shut down"),
        }
    }
}

struct TokenInner {
    cancelled: AtomicBool,
    reason: Mutex<Option<CancellationReason>>,
}

/// A thread-safe cancellation token shared between a job and its submitter
#[derive(Clone)]
pub struct CancellationToken {
    inner: Arc<TokenInner>,
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

impl CancellationToken {
    /// Create a new cancellation token (not cancelled)
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TokenInner {
                cancelled: AtomicBool::new(false),
                reason: Mutex::new(None),
            }),
        }
    }

    /// Cancel this token with default reason (Manual)
    pub fn cancel(&self) {
        self.cancel_with_reason(CancellationReason::Manual);
    }

    /// Cancel this token with a specific reason
    ///
    /// Only the first call records a reason.
    pub fn cancel_with_reason(&self, reason: CancellationReason) {
        let mut slot = self.inner.reason.lock();
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        *slot = Some(reason);
    }

    /// Check if this token has been cancelled
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Returns the cancellation reason (if cancelled)
    pub fn reason(&self) -> Option<CancellationReason> {
        self.inner.reason.lock().clone()
    }

    /// Returns error if cancelled, `Ok(())` otherwise
    ///
    /// Lets job bodies bail out with `token.check()?`.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            let reason = self
                .reason()
                .map(|r| r.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            Err(ThreadError::cancelled("job", reason))
        } else {
            Ok(())
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
