//! Thread pools and the factory that builds them

pub mod config;
pub mod executors;
pub mod factory;
pub mod scheduled;
pub mod thread_pool;
pub mod worker;

pub use config::{BackpressureStrategy, QueueKind, ThreadPoolConfig, CACHED_KEEP_ALIVE};
pub use executors::{new_cache_executor, new_executor, new_scheduled_executor, Executors};
pub use factory::ThreadFactory;
pub use scheduled::ScheduledThreadPool;
pub use thread_pool::ThreadPool;
pub use worker::{JobCounters, PoolStats};
