use std::sync::Arc;

use domains::{paths, ContentStore, Handle, Result, ThreadId, WriteBatch};
use serde_json::Value;
use tracing::info;

use crate::threads::ensure_thread;

/// Bidirectional like relation: `threads/{t}/likedBy/{h}` and
/// `users/{h}/likedThreads/{t}` always change together.
#[derive(Clone)]
pub struct LikeLedger {
    store: Arc<dyn ContentStore>,
}

impl LikeLedger {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    fn both_sides(handle: &Handle, thread_id: &ThreadId, value: Option<Value>) -> WriteBatch {
        let mut batch = WriteBatch::new();
        batch.put(paths::thread_like(thread_id, handle), value.clone());
        batch.put(paths::user_liked_thread(handle, thread_id), value);
        batch
    }

    /// Idempotent; liking twice leaves one entry on each side.
    pub async fn like(&self, handle: &Handle, thread_id: &ThreadId) -> Result<()> {
        ensure_thread(self.store.as_ref(), thread_id).await?;
        self.store
            .update(Self::both_sides(handle, thread_id, Some(Value::Bool(true))))
            .await?;
        info!(thread_id = %thread_id, handle = %handle, "thread liked");
        Ok(())
    }

    /// Idempotent, and works on threads that no longer exist so stale
    /// `likedThreads` entries can still be cleared.
    pub async fn unlike(&self, handle: &Handle, thread_id: &ThreadId) -> Result<()> {
        self.store.update(Self::both_sides(handle, thread_id, None)).await?;
        info!(thread_id = %thread_id, handle = %handle, "thread unliked");
        Ok(())
    }

    /// Flips the like state and returns the new one.
    pub async fn toggle(&self, handle: &Handle, thread_id: &ThreadId) -> Result<bool> {
        if self.is_liked(handle, thread_id).await? {
            self.unlike(handle, thread_id).await?;
            Ok(false)
        } else {
            self.like(handle, thread_id).await?;
            Ok(true)
        }
    }

    pub async fn is_liked(&self, handle: &Handle, thread_id: &ThreadId) -> Result<bool> {
        let marker = self.store.get(&paths::thread_like(thread_id, handle)).await?;
        Ok(marker.as_ref().and_then(Value::as_bool).unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{DomainError, MockContentStore, StorePath};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn carol() -> Handle {
        Handle::new("carol").unwrap()
    }

    #[tokio::test]
    async fn like_writes_both_sides_in_one_update() {
        let mut store = MockContentStore::new();
        store.expect_get().returning(|_| Ok(Some(json!("alice"))));
        store
            .expect_update()
            .times(1)
            .withf(|batch| {
                batch.len() == 2
                    && batch.get(&StorePath::parse("threads/t1/likedBy/carol")) == Some(&Some(json!(true)))
                    && batch.get(&StorePath::parse("users/carol/likedThreads/t1")) == Some(&Some(json!(true)))
            })
            .returning(|_| Ok(()));
        store.expect_set().never();

        assert_ok!(LikeLedger::new(Arc::new(store)).like(&carol(), &ThreadId::new("t1")).await);
    }

    #[tokio::test]
    async fn unlike_deletes_both_sides_in_one_update() {
        let mut store = MockContentStore::new();
        store
            .expect_update()
            .times(1)
            .withf(|batch| batch.len() == 2 && batch.paths().all(|p| batch.get(p) == Some(&None)))
            .returning(|_| Ok(()));

        assert_ok!(LikeLedger::new(Arc::new(store)).unlike(&carol(), &ThreadId::new("t1")).await);
    }

    #[tokio::test]
    async fn liking_a_missing_thread_writes_nothing() {
        let mut store = MockContentStore::new();
        store.expect_get().returning(|_| Ok(None));
        store.expect_update().never();

        let err = assert_err!(LikeLedger::new(Arc::new(store)).like(&carol(), &ThreadId::new("t9")).await);
        assert!(matches!(err, DomainError::NotFound(..)));
    }
}
