//! Bounded worker pool for node fan-out.
//!
//! Each batch submitted to [`WorkerPool::run_all`] runs on its own tasks,
//! with at most `size` of them past the semaphore at any time. The call
//! returns only when every job of the batch has finished, which gives the
//! cluster its phase barrier.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{OrchestratorError, Result};

/// Fixed-size pool bounding concurrent container runtime calls.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    /// Creates a pool with `size` slots. A size of zero is treated as one.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    /// Returns the number of slots.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs every job and waits for all of them.
    ///
    /// A failing job does not cancel its siblings. Results come back in
    /// completion order; a panicked job is reported as `WorkerFailed`.
    pub async fn run_all<I, F, T>(&self, jobs: I) -> Vec<Result<T>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for job in jobs {
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|e| OrchestratorError::worker_failed(e.to_string()))?;
                job.await
            });
        }

        let mut results = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            results.push(joined.unwrap_or_else(|e| Err(OrchestratorError::worker_failed(e.to_string()))));
        }
        results
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_WORKERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let pool = WorkerPool::new(3);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..12).map(|i| {
            let active = active.clone();
            let peak = peak.clone();
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(i)
            }
        });

        let results = pool.run_all(jobs).await;
        assert_eq!(results.len(), 12);

        let mut values: Vec<i32> = results.into_iter().map(|r| r.unwrap()).collect();
        values.sort();
        assert_eq!(values, (0..12).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(active.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let pool = WorkerPool::new(2);
        let finished = Arc::new(AtomicUsize::new(0));

        let jobs = (0..5).map(|i| {
            let finished = finished.clone();
            async move {
                if i == 0 {
                    return Err(OrchestratorError::runtime_operation("run", "10.0.0.1_9000", "no space left"));
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let results = pool.run_all(jobs).await;
        assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_panicking_job() {
        let pool = WorkerPool::new(1);
        let results = pool
            .run_all([async {
                if true {
                    panic!("boom");
                }
                Ok::<(), OrchestratorError>(())
            }])
            .await;
        assert!(matches!(results[0], Err(OrchestratorError::WorkerFailed(_))));
    }

    #[test]
    fn test_zero_size_pool() {
        assert_eq!(WorkerPool::new(0).size(), 1);
        assert_eq!(WorkerPool::default().size(), 5);
    }
}
