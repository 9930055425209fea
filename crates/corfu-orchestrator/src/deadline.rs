//! Deadline-guarded execution.
//!
//! The guarded work runs on its own task while the caller waits on a timer.
//! When the timer wins, the task is aborted, the container named as the
//! cleanup target is force-removed, and the caller gets a `Timeout` error.
//! Removing the container is what actually stops the work; the abort only
//! takes effect at the task's next suspension point.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::backend::SharedRuntime;
use crate::error::{OrchestratorError, Result};
use crate::node::remove_container;

/// Deadline applied when none is configured.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(30);

/// Deadline of the bootstrap cmdlet.
pub const BOOTSTRAP_DEADLINE: Duration = Duration::from_secs(60);

/// Runs one operation under a wall-clock deadline.
pub struct DeadlineGuard {
    operation: String,
    deadline: Duration,
    cleanup_target: Option<String>,
    runtime: SharedRuntime,
}

impl DeadlineGuard {
    /// Creates a guard for `operation` with the default deadline and no
    /// cleanup target.
    pub fn new(operation: impl Into<String>, runtime: SharedRuntime) -> Self {
        Self {
            operation: operation.into(),
            deadline: DEFAULT_DEADLINE,
            cleanup_target: None,
            runtime,
        }
    }

    /// Sets the deadline.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    /// Names the container removed when the deadline elapses.
    pub fn cleanup_target(mut self, name: impl Into<String>) -> Self {
        self.cleanup_target = Some(name.into());
        self
    }

    /// Runs `work`, returning its result or a `Timeout` error.
    ///
    /// A result produced before the deadline is returned unchanged, errors
    /// included. A panicking task surfaces as `WorkerFailed`.
    pub async fn run<F, T>(&self, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let mut task = tokio::spawn(work);

        match tokio::time::timeout(self.deadline, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(OrchestratorError::worker_failed(format!(
                "{}: {}",
                self.operation, e
            ))),
            Err(elapsed) => {
                warn!(
                    operation = %self.operation,
                    deadline = ?self.deadline,
                    target = ?self.cleanup_target,
                    "Deadline elapsed"
                );
                task.abort();
                self.cleanup().await;
                Err(OrchestratorError::timeout(&self.operation, self.deadline, elapsed))
            }
        }
    }

    async fn cleanup(&self) {
        let Some(target) = &self.cleanup_target else {
            return;
        };

        match remove_container(self.runtime.as_ref(), target).await {
            Ok(()) => debug!(container = %target, "Removed container of timed out operation"),
            Err(e) => warn!(container = %target, error = %e, "Failed to remove container of timed out operation"),
        }
    }
}

/// Runs `work` under `deadline`, removing `cleanup_target` if it overruns.
pub async fn run_with_deadline<F, T>(
    operation: &str,
    work: F,
    deadline: Duration,
    cleanup_target: Option<&str>,
    runtime: SharedRuntime,
) -> Result<T>
where
    F: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut guard = DeadlineGuard::new(operation, runtime).deadline(deadline);
    if let Some(target) = cleanup_target {
        guard = guard.cleanup_target(target);
    }
    guard.run(work).await
}
