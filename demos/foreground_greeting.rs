//! Background work that hands its result back to the main thread
//!
//! The main thread prepares the process main loop, a pool thread does some
//! work, and two seconds later a greeting runs on the main thread and stops
//! the loop.
//!
//! Run with: RUST_LOG=debug cargo run --example foreground_greeting

use light_threads::prelude::*;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> Result<()> {
    env_logger::init();

    println!("=== Light Threads - Foreground Greeting ===\n");

    let looper = Looper::prepare_main()?;
    let main = Looper::main_handle().ok_or_else(|| ThreadError::other("main looper missing"))?;
    let threads = LightThreads::new(Arc::new(main))?.install()?;

    let started = Instant::now();
    println!(
        "1. Main thread: {:?}",
        thread::current().name().unwrap_or("unnamed")
    );

    // From the main thread this always goes to the background pool
    let handle = threads.run_in_background(move || {
        let name = thread::current().name().unwrap_or("unnamed").to_string();
        println!("2. Background work on '{}'", name);

        let sum: u64 = (1..=1_000u64).sum();
        let threads = LightThreads::global().ok_or_else(|| ThreadError::other("no context"))?;

        threads.run_in_foreground_delayed(
            move || {
                println!(
                    "3. Hello from the main thread after {:?}: background said {}",
                    started.elapsed(),
                    sum
                );
                if let Some(main) = Looper::main_handle() {
                    main.quit();
                }
            },
            Duration::from_millis(2000),
        )
    })?;

    looper.run()?;

    if let Some(handle) = handle {
        handle.join()?;
    }

    let stats = threads.background().stats();
    println!("\n4. Background pool '{}':", stats.name);
    println!("   Threads created: {}", stats.threads_created);
    println!("   Jobs completed: {}", stats.jobs_completed);

    threads.shutdown()?;
    println!("\n=== Example completed successfully ===");
    Ok(())
}
