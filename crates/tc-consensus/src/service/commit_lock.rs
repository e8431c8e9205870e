//! Reader/writer lock between message processing and the commit transition.

use std::future::Future;

use tokio::sync::RwLock;

/// Many processors may hold the lock at once; committing a height takes it
/// exclusively, so no message is admitted while a commit is being applied.
#[derive(Debug, Default)]
pub struct CommitLock {
    lock: RwLock<()>,
}

impl CommitLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` alongside other non-exclusive holders
    pub async fn run_non_exclusive<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.lock.read().await;
        task.await
    }

    /// Run `task` with no other holder
    pub async fn run_exclusive<F, T>(&self, task: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.lock.write().await;
        task.await
    }
}
