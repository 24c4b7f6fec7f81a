pub mod poller;

use std::collections::HashMap;
use std::future::Future;
use tokio::task::JoinHandle;

/// Long-running jobs owned by the app. One task per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    DashboardPoll,
}

/// Tracks running background tasks and provides cancellation support
pub struct BackgroundTaskManager {
    tasks: HashMap<TaskKind, JoinHandle<()>>,
}

impl BackgroundTaskManager {
    pub fn new() -> Self {
        Self {
            tasks: HashMap::new(),
        }
    }

    /// Spawn a task, aborting any still-running task of the same kind
    pub fn spawn_task<F>(&mut self, kind: TaskKind, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Some(handle) = self.tasks.remove(&kind) {
            handle.abort();
        }

        let handle = tokio::spawn(future);
        self.tasks.insert(kind, handle);
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.tasks
            .get(&kind)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Cancel all running tasks (logout, unmount, shutdown)
    pub fn cancel_all(&mut self) {
        for (kind, handle) in self.tasks.drain() {
            tracing::debug!(?kind, "Cancelling background task");
            handle.abort();
        }
    }
}

impl Default for BackgroundTaskManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BackgroundTaskManager {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
