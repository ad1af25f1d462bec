//! Optional fan-out of independent loop iterations to a worker pool.
//!
//! Workers never see the caller's [`Context`](crate::Context): each job carries
//! a copy of plain JSON values and runs in a fresh context of its own. Results
//! come back in input order.

pub mod for_each;
pub mod pool;

pub use for_each::ParallelForEach;
pub use pool::{InlinePool, TokioPool, WorkerJob, WorkerPool, WorkerTask};
