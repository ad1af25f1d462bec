//! Worker pools executing jobs built from copied context values.

use std::{num::NonZeroUsize, sync::Arc, thread};

use futures_util::future::join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use scopeflow_util::block_on_future;

use crate::errors::{FlowError, FlowResult};

/// Input of one worker invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerJob {
    /// Position of the job in the input sequence.
    pub index: usize,
    pub variables: IndexMap<String, Value>,
}

/// Computation applied to every job.
pub type WorkerTask = Arc<dyn Fn(WorkerJob) -> FlowResult<Value> + Send + Sync>;

/// Runs jobs and returns one result per job, in input order.
pub trait WorkerPool: Send + Sync {
    fn run(&self, jobs: Vec<WorkerJob>, task: WorkerTask) -> Vec<FlowResult<Value>>;
}

/// Runs jobs one after another on the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlinePool;

impl WorkerPool for InlinePool {
    fn run(&self, jobs: Vec<WorkerJob>, task: WorkerTask) -> Vec<FlowResult<Value>> {
        jobs.into_iter().map(|job| task(job)).collect()
    }
}

/// Runs jobs as blocking tasks on a multi-thread Tokio runtime.
///
/// At most `max_workers` jobs run at once.
#[derive(Debug, Clone, Copy)]
pub struct TokioPool {
    max_workers: usize,
}

impl TokioPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

impl Default for TokioPool {
    /// One worker per available CPU.
    fn default() -> Self {
        Self::new(thread::available_parallelism().map(NonZeroUsize::get).unwrap_or(1))
    }
}

impl WorkerPool for TokioPool {
    fn run(&self, jobs: Vec<WorkerJob>, task: WorkerTask) -> Vec<FlowResult<Value>> {
        let job_count = jobs.len();
        let semaphore = Arc::new(Semaphore::new(self.max_workers));
        debug!(jobs = job_count, max_workers = self.max_workers, "dispatching worker jobs");

        let fan_out = async move {
            let handles = jobs.into_iter().map(|job| {
                let semaphore = Arc::clone(&semaphore);
                let task = Arc::clone(&task);
                let index = job.index;
                tokio::spawn(async move {
                    let _permit = match semaphore.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(error) => return Err(FlowError::runtime(format!("worker pool closed: {error}"))),
                    };
                    match tokio::task::spawn_blocking(move || task(job)).await {
                        Ok(result) => result,
                        Err(error) => Err(FlowError::runtime(format!("worker {index} did not complete: {error}"))),
                    }
                })
            });
            let results = join_all(handles)
                .await
                .into_iter()
                .map(|joined| joined.unwrap_or_else(|error| Err(FlowError::runtime(format!("worker task failed: {error}")))))
                .collect::<Vec<_>>();
            Ok::<_, anyhow::Error>(results)
        };

        match block_on_future(fan_out, self.max_workers) {
            Ok(results) => results,
            Err(error) => {
                warn!(error = %error, "worker pool could not start");
                (0..job_count)
                    .map(|_| Err(FlowError::runtime(format!("worker pool unavailable: {error}"))))
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    fn jobs(count: usize) -> Vec<WorkerJob> {
        (0..count)
            .map(|index| WorkerJob {
                index,
                variables: IndexMap::from([("n".to_string(), json!(index))]),
            })
            .collect()
    }

    fn square() -> WorkerTask {
        Arc::new(|job: WorkerJob| {
            let n = job.variables["n"].as_u64().unwrap_or_default();
            thread::sleep(Duration::from_millis((10 - n) * 2));
            Ok(json!(n * n))
        })
    }

    #[test]
    fn inline_pool_runs_in_order() {
        let results: Vec<Value> = InlinePool.run(jobs(4), square()).into_iter().map(Result::unwrap).collect();
        assert_eq!(results, vec![json!(0), json!(1), json!(4), json!(9)]);
    }

    #[test]
    fn tokio_pool_preserves_input_order() {
        let results: Vec<Value> = TokioPool::new(4).run(jobs(6), square()).into_iter().map(Result::unwrap).collect();
        assert_eq!(results, vec![json!(0), json!(1), json!(4), json!(9), json!(16), json!(25)]);
    }

    #[test]
    fn tokio_pool_bounds_concurrency() {
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let task: WorkerTask = {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            Arc::new(move |_job| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                running.fetch_sub(1, Ordering::SeqCst);
                Ok(Value::Null)
            })
        };
        let results = TokioPool::new(2).run(jobs(6), task);
        assert_eq!(results.len(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn failures_stay_in_position() {
        let task: WorkerTask = Arc::new(|job: WorkerJob| {
            if job.index == 1 {
                Err(FlowError::step_failed("odd one out"))
            } else {
                Ok(json!(job.index))
            }
        });
        let results = TokioPool::new(3).run(jobs(3), task);
        assert!(results[0].is_ok());
        assert_eq!(results[1].as_ref().unwrap_err().message(), "odd one out");
        assert!(results[2].is_ok());
    }
}
