//! # Light Threads
//!
//! Helpers for running work in the background on worker threads or in the
//! foreground on a designated main thread, plus a factory for thread pools
//! with named, prioritized threads and centralized failure reporting.
//!
//! ## Features
//!
//! - **Dispatch**: [`LightThreads`] decides between inline and queued
//!   execution from the calling thread's identity
//! - **Pool factory**: fixed, cached (direct handoff), and scheduled pools via
//!   [`Executors`], threads named `<name>-<pool>-thread<n>`
//! - **Handles**: cancellable, awaitable [`TaskHandle`]s carrying a task's
//!   result or failure
//! - **Exception sink**: every failure on a pool thread is passed to one
//!   pluggable [`ExceptionSink`]
//! - **Priorities**: [`PriorityJob`] runs work at an explicit
//!   [`ThreadPriority`]
//!
//! ## Quick Start
//!
//! ```rust
//! use light_threads::prelude::*;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # fn main() -> Result<()> {
//! let looper = Looper::new();
//! let threads = LightThreads::new(Arc::new(looper.handle()))?;
//!
//! // Work for the background pool
//! let handle = threads.run_in_background(|| {
//!     println!("crunching numbers");
//!     Ok(())
//! })?;
//!
//! // Work for the main thread, after a delay
//! threads.run_in_foreground_delayed(|| println!("back on the main thread"), Duration::from_millis(10))?;
//!
//! # if let Some(handle) = handle { handle.join()?; }
//! looper.run_until(std::time::Instant::now() + Duration::from_millis(50))?;
//! # threads.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Pools
//!
//! ```rust
//! use light_threads::prelude::*;
//!
//! # fn main() -> Result<()> {
//! let pool = new_cache_executor("Downloads", 8)?;
//!
//! let handle = pool.submit(|| Ok("payload".len()))?;
//! assert_eq!(handle.get()?, 7);
//! # pool.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Custom Jobs
//!
//! ```rust
//! use light_threads::prelude::*;
//!
//! struct Thumbnail {
//!     path: String,
//! }
//!
//! impl Job for Thumbnail {
//!     fn execute(&mut self) -> Result<()> {
//!         println!("Rendering: {}", self.path);
//!         Ok(())
//!     }
//!
//!     fn job_type(&self) -> &str {
//!         "Thumbnail"
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! # let pool = new_executor(1, "Render")?;
//! pool.execute_job(PriorityJob::new(Thumbnail {
//!     path: "cat.png".to_string(),
//! }))?;
//! # pool.shutdown()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod dispatch;
pub mod looper;
pub mod pool;
pub mod prelude;
pub mod queue;
pub mod sink;

pub use crate::core::{
    BoxedJob, CancellationReason, CancellationToken, ClosureJob, Job, PriorityJob, Result,
    TaskHandle, ThreadError, ThreadPriority,
};
pub use dispatch::{LightThreads, LightThreadsBuilder};
pub use looper::{Looper, MainHandle, MainThread};
pub use pool::{
    new_cache_executor, new_executor, new_scheduled_executor, Executors, PoolStats,
    ScheduledThreadPool, ThreadPool, ThreadPoolConfig,
};
pub use sink::{ExceptionSink, FailureContext, FailureOrigin, LogSink};
