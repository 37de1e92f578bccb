use std::future::Future;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Remote work started by the controller, grouped by session epoch.
///
/// Cancelling aborts every task and advances the epoch. Results are tagged
/// with the epoch they were started in, so anything from an earlier epoch
/// that still arrives can be recognized and dropped.
pub struct TaskTracker {
    tasks: JoinSet<()>,
    epoch: u64,
}

impl TaskTracker {
    pub fn new() -> Self {
        Self {
            tasks: JoinSet::new(),
            epoch: 0,
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    pub fn spawn<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.spawn(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Collect finished tasks without waiting.
    pub fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                if e.is_panic() {
                    error!(error = %e, "Controller task panicked");
                }
            }
        }
    }

    /// Abort everything in flight and start a new epoch.
    pub fn cancel_all(&mut self) -> u64 {
        if !self.tasks.is_empty() {
            debug!(count = self.tasks.len(), epoch = self.epoch, "Cancelling tasks");
        }
        self.tasks.abort_all();
        self.epoch += 1;
        self.epoch
    }

    pub async fn shutdown(&mut self) {
        self.cancel_all();
        while self.tasks.join_next().await.is_some() {}
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}
