//! Bookkeeping for subscription tasks, shared by every adapter that
//! delivers changes from a background task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use domains::Subscription;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub(crate) struct Listeners {
    tasks: Arc<DashMap<u64, JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl Listeners {
    /// Tracks `task` and returns the handle that aborts it.
    pub(crate) fn register(&self, task: JoinHandle<()>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.tasks.insert(id, task);
        let tasks = Arc::clone(&self.tasks);
        Subscription::new(move || {
            if let Some((_, task)) = tasks.remove(&id) {
                task.abort();
            }
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }
}

impl Drop for Listeners {
    fn drop(&mut self) {
        for entry in self.tasks.iter() {
            entry.value().abort();
        }
    }
}
