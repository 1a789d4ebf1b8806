//! Convenient re-exports for common types and traits

pub use crate::core::{
    BoxedJob, CancellationToken, ClosureJob, Job, PriorityJob, Result, TaskHandle, ThreadError,
    ThreadPriority,
};
pub use crate::dispatch::LightThreads;
pub use crate::looper::{Looper, MainHandle, MainThread};
pub use crate::pool::{
    new_cache_executor, new_executor, new_scheduled_executor, Executors, PoolStats,
    ScheduledThreadPool, ThreadPool, ThreadPoolConfig,
};
pub use crate::sink::{ExceptionSink, FailureContext, LogSink};
