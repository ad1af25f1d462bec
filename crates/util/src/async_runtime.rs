//! Async runtime helpers for blocking callers.
//!
//! The engine itself is synchronous. The parallel worker pool fans work out on
//! a Tokio runtime; this module is the single entry point for driving such a
//! future to completion from synchronous code.

use anyhow::anyhow;
use std::{future::Future, thread};
use tokio::{
    runtime::{Handle, Runtime, RuntimeFlavor},
    task,
};

/// Execute an async future from synchronous code.
///
/// # Arguments
/// - `future`: The future to run to completion.
/// - `worker_threads`: Size of the runtime created when no multi-thread runtime is current.
///
/// # Notes
/// - Reuses the current multi-thread runtime when called from inside one.
/// - Inside a current-thread runtime, which cannot be blocked on, the future
///   runs on a dedicated thread with its own runtime.
/// - Otherwise builds a dedicated multi-thread runtime for the call.
pub fn block_on_future<F, T>(future: F, worker_threads: usize) -> anyhow::Result<T>
where
    F: Future<Output = anyhow::Result<T>> + Send + 'static,
    T: Send + 'static,
{
    match Handle::try_current() {
        Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
            task::block_in_place(|| handle.block_on(future))
        }
        Ok(_) => thread::scope(|scope| {
            scope
                .spawn(|| build_runtime(worker_threads)?.block_on(future))
                .join()
                .map_err(|_| anyhow!("async runtime thread panicked"))?
        }),
        Err(_) => build_runtime(worker_threads)?.block_on(future),
    }
}

fn build_runtime(worker_threads: usize) -> anyhow::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads.max(1))
        .enable_all()
        .build()
        .map_err(|error| anyhow!(error))
}
