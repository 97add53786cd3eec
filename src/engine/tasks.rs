//! Task lifecycle tracking
//!
//! Every long-running loop registers with a [`TaskGroup`] when it starts and
//! observes the group's stop signal. `stop` broadcasts the signal and waits
//! until every registration has been released.

use crate::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct TaskGroup {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

/// Registration of one running task; released on drop
#[derive(Debug)]
pub struct TaskHandle {
    name: &'static str,
    cancel: CancellationToken,
    _token: TaskTrackerToken,
}

impl TaskGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the calling task
    pub fn begin(&self, name: &'static str) -> TaskHandle {
        debug!(task = name, "Task started");
        TaskHandle {
            name,
            cancel: self.cancel.clone(),
            _token: self.tracker.token(),
        }
    }

    /// Spawn `fut` as a registered task
    pub fn spawn<F>(&self, name: &'static str, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = self.begin(name);
        tokio::spawn(async move {
            fut.await;
            drop(handle);
        });
    }

    pub fn is_stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolves once the stop signal fires
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Stop signal for a subset of tasks; also fires when the group stops
    pub fn child_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Broadcast the stop signal
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until every registered task has finished
    pub async fn wait(&self, timeout: Duration) -> Result<()> {
        self.tracker.close();
        tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .map_err(|_| Error::StopTimeout)
    }

    /// Number of registered tasks still running
    pub fn running(&self) -> usize {
        self.tracker.len()
    }
}

impl TaskHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stopping(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        debug!(task = self.name, "Task finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_stop_waits_for_spawned_tasks() {
        let group = TaskGroup::new();
        let finished = Arc::new(AtomicBool::new(false));

        {
            let group2 = group.clone();
            let finished = finished.clone();
            group.spawn("worker", async move {
                group2.cancelled().await;
                tokio::time::sleep(Duration::from_millis(20)).await;
                finished.store(true, Ordering::SeqCst);
            });
        }
        assert_eq!(group.running(), 1);

        group.cancel();
        group.wait(Duration::from_secs(1)).await.unwrap();

        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(group.running(), 0);
    }

    #[tokio::test]
    async fn test_handle_observes_stop() {
        let group = TaskGroup::new();
        let handle = group.begin("listen");
        assert_eq!(handle.name(), "listen");
        assert!(!handle.stopping());

        group.cancel();
        assert!(handle.stopping());
        assert!(group.is_stopping());

        drop(handle);
        group.wait(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_child_token() {
        let group = TaskGroup::new();

        let first = group.child_token();
        first.cancel();
        assert!(!group.is_stopping());

        let second = group.child_token();
        group.cancel();
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn test_wait_times_out_on_stuck_task() {
        let group = TaskGroup::new();
        let _stuck = group.begin("stuck");

        group.cancel();
        let err = group.wait(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, Error::StopTimeout));
    }
}
