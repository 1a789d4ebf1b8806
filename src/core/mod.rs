//! Core types and traits for the thread system

pub mod cancellation;
pub mod error;
pub mod handle;
pub mod job;
pub mod priority;

pub use cancellation::{CancellationReason, CancellationToken};
pub use error::{Result, ThreadError};
pub use handle::TaskHandle;
pub use job::{BoxedJob, ClosureJob, Job};
pub use priority::{PriorityGuard, PriorityJob, ThreadPriority};
