//! Deferred-task schedulers: the host's keep-alive facility.
//!
//! A hook handler that starts work outliving its own dispatch hands that
//! work to the scheduler carried by the [`ActivationContext`]. Hosts that
//! can wait for background work before terminating supply a
//! [`TrackedScheduler`]; hosts that cannot fall back to the
//! [`DetachedScheduler`], which still runs the work but cannot promise it
//! finishes.
//!
//! [`ActivationContext`]: super::context::ActivationContext

use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Extends the lifetime of the current unit of work until a task completes.
pub trait DeferredTaskScheduler: Send + Sync + std::fmt::Debug {
    /// Runs `task` and asks the host to wait for it before terminating.
    fn wait_until(&self, label: &str, task: BoxFuture<'static, ()>);

    /// Whether the host actually waits for scheduled tasks.
    fn extends_lifetime(&self) -> bool;
}

/// Scheduler backed by a `TaskTracker` that the host drains on shutdown.
#[derive(Debug, Clone, Default)]
pub struct TrackedScheduler {
    tracker: TaskTracker,
}

impl TrackedScheduler {
    /// Creates a new scheduler with no pending tasks.
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
        }
    }

    /// Number of scheduled tasks that have not completed yet.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Waits for every scheduled task, up to `timeout`.
    ///
    /// Returns `true` when all tasks completed in time. Tasks scheduled
    /// while draining are still awaited.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        if !drained {
            warn!(
                pending = self.tracker.len(),
                timeout_ms = timeout.as_millis() as u64,
                "Deferred tasks still running after drain timeout"
            );
        }
        drained
    }
}

impl DeferredTaskScheduler for TrackedScheduler {
    fn wait_until(&self, label: &str, task: BoxFuture<'static, ()>) {
        let label = label.to_string();
        debug!(task = %label, "Deferred task scheduled");
        self.tracker.spawn(async move {
            task.await;
            debug!(task = %label, "Deferred task completed");
        });
    }

    fn extends_lifetime(&self) -> bool {
        true
    }
}

/// Fallback for hosts without a keep-alive facility.
///
/// The task is spawned detached; the host may exit before it finishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedScheduler;

impl DeferredTaskScheduler for DetachedScheduler {
    fn wait_until(&self, label: &str, task: BoxFuture<'static, ()>) {
        warn!(
            task = %label,
            "No keep-alive facility available; deferred task may be interrupted before completion"
        );
        tokio::spawn(task);
    }

    fn extends_lifetime(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use futures::FutureExt;

    use super::*;

    #[tokio::test]
    async fn test_tracked_drain_waits_for_tasks() {
        let scheduler = TrackedScheduler::new();
        let done = Arc::new(AtomicBool::new(false));
        let flag = done.clone();

        scheduler.wait_until(
            "slow",
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                flag.store(true, Ordering::SeqCst);
            }
            .boxed(),
        );

        assert!(scheduler.drain(Duration::from_secs(5)).await);
        assert!(done.load(Ordering::SeqCst));
        assert_eq!(scheduler.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracked_drain_gives_up_after_timeout() {
        let scheduler = TrackedScheduler::new();
        scheduler.wait_until("forever", futures::future::pending::<()>().boxed());

        assert!(!scheduler.drain(Duration::from_secs(1)).await);
        assert_eq!(scheduler.pending(), 1);
    }

    #[tokio::test]
    async fn test_detached_still_runs_task() {
        let (tx, rx) = tokio::sync::oneshot::channel();
        DetachedScheduler.wait_until(
            "detached",
            async move {
                let _ = tx.send(7);
            }
            .boxed(),
        );
        assert_eq!(rx.await.unwrap(), 7);
        assert!(!DetachedScheduler.extends_lifetime());
    }
}
