use std::sync::Arc;

use domains::{paths, ContentStore, Result, StorePath, Subscription, ThreadId, ThreadStats};
use serde_json::Value;
use tracing::{debug, warn};

use crate::records::{child_count, decode, thread_count, ThreadRecord};

/// Pushes recomputed aggregate counts to listeners on every store change.
///
/// Callbacks run on the store's notification task and must not block.
#[derive(Clone)]
pub struct ChangeNotifier {
    store: Arc<dyn ContentStore>,
}

impl ChangeNotifier {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Invokes `callback` with the current thread count, then again after
    /// every change to the thread collection until the handle is released.
    pub async fn subscribe_thread_count<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        let subscription = self
            .store
            .subscribe(&paths::threads(), Box::new(move |value| callback(thread_count(value.as_ref()))))
            .await?;
        debug!("thread count subscription opened");
        Ok(subscription)
    }

    /// Live comment and like counts of one thread; a deleted thread reports zeros.
    pub async fn subscribe_thread_stats<F>(&self, thread_id: &ThreadId, callback: F) -> Result<Subscription>
    where
        F: Fn(ThreadStats) + Send + Sync + 'static,
    {
        let path = paths::thread(thread_id);
        let watched = path.clone();
        let subscription = self
            .store
            .subscribe(&path, Box::new(move |value| callback(stats_of(&watched, value))))
            .await?;
        debug!(thread_id = %thread_id, "thread stats subscription opened");
        Ok(subscription)
    }

    pub async fn count_threads(&self) -> Result<usize> {
        Ok(thread_count(self.store.get(&paths::threads()).await?.as_ref()))
    }

    pub async fn count_users(&self) -> Result<usize> {
        Ok(child_count(self.store.get(&paths::users()).await?.as_ref()))
    }
}

/// Counts through `ThreadRecord` so live stats match listings. Absent and
/// authorless nodes report zeros.
fn stats_of(path: &StorePath, thread: Option<Value>) -> ThreadStats {
    match thread {
        Some(value) if value.get("author").is_some() => match decode::<ThreadRecord>(path, value) {
            Ok(record) => record.stats(),
            Err(err) => {
                warn!(error = %err, "undecodable thread record in stats subscription");
                ThreadStats::default()
            }
        },
        _ => ThreadStats::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockContentStore, StorePath};
    use mockall::predicate::eq;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio_test::assert_ok;

    #[test]
    fn stats_count_nested_children() {
        let path = StorePath::parse("threads/t1");
        let comment = json!({"author": "bob", "text": "Nice!", "createdOn": "2024-05-01T11:00:00Z"});
        let thread = json!({
            "author": "alice",
            "title": "Everest Trip",
            "content": "Amazing climb",
            "createdOn": "2024-05-01T10:00:00Z",
            "location": "Nepal",
            "likedBy": {"bob": true, "carol": true, "dave": false},
            "comments": {"c1": comment.clone(), "c2": comment.clone(), "c3": comment}
        });
        assert_eq!(
            stats_of(&path, Some(thread)),
            ThreadStats { comment_count: 3, like_count: 2 }
        );
        assert_eq!(stats_of(&path, None), ThreadStats::default());
        // a like landing after the delete leaves a stray node
        assert_eq!(
            stats_of(&path, Some(json!({"likedBy": {"bob": true}}))),
            ThreadStats::default()
        );
    }

    #[tokio::test]
    async fn thread_count_callback_sees_collection_size() {
        let mut store = MockContentStore::new();
        store
            .expect_subscribe()
            .withf(|path, _| *path == StorePath::parse("threads"))
            .times(1)
            .returning(|_, on_change| {
                on_change(Some(json!({"t1": {"author": "alice"}, "t2": {"author": "bob"}, "t3": {}})));
                on_change(None);
                Ok(Subscription::new(|| {}))
            });

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let notifier = ChangeNotifier::new(Arc::new(store));
        let _subscription = assert_ok!(
            notifier
                .subscribe_thread_count(move |count| sink.lock().unwrap().push(count))
                .await
        );

        assert_eq!(*seen.lock().unwrap(), vec![2, 0]);
    }

    #[tokio::test]
    async fn counts_are_one_shot_reads() {
        let mut store = MockContentStore::new();
        store
            .expect_get()
            .with(eq(StorePath::parse("users")))
            .returning(|_| Ok(Some(json!({"alice": {}, "bob": {}, "carol": {}}))));
        store
            .expect_get()
            .with(eq(StorePath::parse("threads")))
            .returning(|_| Ok(Some(json!({"t1": {"author": "alice"}, "t2": {"likedBy": {"bob": true}}}))));
        store.expect_subscribe().never();

        let notifier = ChangeNotifier::new(Arc::new(store));
        assert_eq!(assert_ok!(notifier.count_users().await), 3);
        assert_eq!(assert_ok!(notifier.count_threads().await), 1);
    }
}
