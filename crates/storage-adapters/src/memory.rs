//! # In-memory content store
//!
//! A single JSON tree behind an async `RwLock`. Every mutating call takes the
//! write lock once, so a multi-path `update` is observed all-or-nothing.
//! After each commit the changed paths are broadcast; every subscription is a
//! task that re-reads its path when a broadcast overlaps it.

use std::sync::Arc;

use async_trait::async_trait;
use domains::{ChangeCallback, ContentStore, StoreError, StorePath, Subscription, WriteBatch};
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::listeners::Listeners;
use crate::tree;

/// Capacity of the change broadcast channel when none is configured.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

type ChangeSet = Arc<[StorePath]>;

pub struct InMemoryContentStore {
    tree: Arc<RwLock<Value>>,
    changes: broadcast::Sender<ChangeSet>,
    listeners: Listeners,
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// `capacity` bounds how many change sets a slow subscriber may fall
    /// behind before it skips ahead to the current value.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::from_tree(Value::Object(Map::new()), capacity)
    }

    /// Restores a store from a JSON document previously taken with `snapshot`.
    pub fn from_snapshot(snapshot: Value, capacity: usize) -> Result<Self, StoreError> {
        match tree::normalize(snapshot) {
            None => Ok(Self::with_capacity(capacity)),
            Some(root @ Value::Object(_)) => Ok(Self::from_tree(root, capacity)),
            Some(_) => Err(StoreError::InvalidPath {
                path: String::new(),
                reason: "snapshot root must be an object".into(),
            }),
        }
    }

    fn from_tree(root: Value, capacity: usize) -> Self {
        let (changes, _) = broadcast::channel(capacity.max(1));
        Self {
            tree: Arc::new(RwLock::new(root)),
            changes,
            listeners: Listeners::default(),
        }
    }

    /// A copy of the whole tree.
    pub async fn snapshot(&self) -> Value {
        self.tree.read().await.clone()
    }

    /// Subscriptions that have not been released yet.
    pub fn active_subscriptions(&self) -> usize {
        self.listeners.len()
    }

    fn publish(&self, changed: Vec<StorePath>) {
        // No receivers simply means nobody is subscribed.
        let _ = self.changes.send(changed.into());
    }

    fn check_root_write(path: &StorePath, value: &Option<Value>) -> Result<(), StoreError> {
        match value {
            Some(v) if path.is_root() && !v.is_object() && !v.is_null() => Err(StoreError::InvalidPath {
                path: String::new(),
                reason: "the root can only hold an object".into(),
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        tree::validate(path)?;
        Ok(tree::read(&*self.tree.read().await, path))
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        let value = Some(value);
        tree::validate(path)?;
        Self::check_root_write(path, &value)?;
        tree::write(&mut *self.tree.write().await, path, value);
        self.publish(vec![path.clone()]);
        Ok(())
    }

    async fn update(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        for path in batch.paths() {
            tree::validate(path)?;
        }
        if let Some((outer, inner)) = batch.find_overlap() {
            return Err(StoreError::InvalidPath {
                path: inner.to_string(),
                reason: format!("overlaps `{outer}` in the same update"),
            });
        }
        if let Some(value) = batch.get(&StorePath::root()) {
            Self::check_root_write(&StorePath::root(), value)?;
        }

        let changed: Vec<StorePath> = batch.paths().cloned().collect();
        {
            let mut root = self.tree.write().await;
            for (path, value) in batch {
                tree::write(&mut root, &path, value);
            }
        }
        debug!(paths = changed.len(), "applied multi-path update");
        self.publish(changed);
        Ok(())
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        let key = self.generate_key();
        self.set(&path.child(&key), value).await?;
        Ok(key)
    }

    fn generate_key(&self) -> String {
        Uuid::now_v7().simple().to_string()
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        tree::validate(path)?;
        tree::write(&mut *self.tree.write().await, path, None);
        self.publish(vec![path.clone()]);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        path: &StorePath,
        expected: Option<Value>,
        new: Option<Value>,
    ) -> Result<bool, StoreError> {
        tree::validate(path)?;
        Self::check_root_write(path, &new)?;
        {
            let mut root = self.tree.write().await;
            if tree::read(&root, path) != expected.and_then(tree::normalize) {
                return Ok(false);
            }
            tree::write(&mut root, path, new);
        }
        self.publish(vec![path.clone()]);
        Ok(true)
    }

    async fn subscribe(
        &self,
        path: &StorePath,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError> {
        tree::validate(path)?;
        // Subscribe before the first read so no commit falls in between.
        let mut changes = self.changes.subscribe();
        on_change(tree::read(&*self.tree.read().await, path));

        let root = Arc::clone(&self.tree);
        let watched = path.clone();
        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(changed) => {
                        if !changed.iter().any(|p| p.overlaps(&watched)) {
                            continue;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(path = %watched, skipped, "subscriber lagged behind, re-reading current value");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
                let current = tree::read(&*root.read().await, &watched);
                on_change(current);
            }
        });

        debug!(path = %path, "subscription registered");
        Ok(self.listeners.register(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};

    fn p(path: &str) -> StorePath {
        StorePath::parse(path)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<Option<Value>>) -> Option<Value> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for change")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn push_generates_ordered_keys() {
        let store = InMemoryContentStore::new();
        let first = store.push(&p("threads"), json!({"title": "a"})).await.unwrap();
        let second = store.push(&p("threads"), json!({"title": "b"})).await.unwrap();
        assert!(first < second);

        let threads = store.get(&p("threads")).await.unwrap().unwrap();
        let keys: Vec<&String> = threads.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec![&first, &second]);
    }

    #[tokio::test]
    async fn update_applies_all_paths() {
        let store = InMemoryContentStore::new();
        let batch = WriteBatch::new()
            .set(p("threads/t1/likedBy/carol"), true)
            .set(p("users/carol/likedThreads/t1"), true);
        assert_ok!(store.update(batch).await);

        assert_eq!(store.get(&p("threads/t1/likedBy/carol")).await.unwrap(), Some(json!(true)));
        assert_eq!(store.get(&p("users/carol/likedThreads/t1")).await.unwrap(), Some(json!(true)));
    }

    #[tokio::test]
    async fn overlapping_update_is_rejected_without_writing() {
        let store = InMemoryContentStore::new();
        let batch = WriteBatch::new()
            .set(p("threads/t1"), json!({"title": "x"}))
            .set(p("threads/t1/likedBy/bob"), true)
            .set(p("users/bob/likedThreads/t1"), true);
        let err = assert_err!(store.update(batch).await);
        assert!(matches!(err, StoreError::InvalidPath { .. }));
        assert_eq!(store.snapshot().await, json!({}));
    }

    #[tokio::test]
    async fn invalid_path_fails_whole_batch() {
        let store = InMemoryContentStore::new();
        let batch = WriteBatch::new()
            .set(p("users/bob/likedThreads/t1"), true)
            .set(p("threads/t.1/likedBy/bob"), true);
        assert_err!(store.update(batch).await);
        assert_eq!(store.get(&p("users")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn compare_and_set_only_writes_on_match() {
        let store = InMemoryContentStore::new();
        let path = p("tagIndex/abc");
        assert!(store.compare_and_set(&path, None, Some(json!("g1"))).await.unwrap());
        assert!(!store.compare_and_set(&path, None, Some(json!("g2"))).await.unwrap());
        assert!(store.compare_and_set(&path, Some(json!("g1")), None).await.unwrap());
        assert_eq!(store.get(&path).await.unwrap(), None);
    }

    #[tokio::test]
    async fn subscription_sees_initial_and_nested_changes() {
        let store = InMemoryContentStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = store
            .subscribe(&p("threads"), Box::new(move |v| {
                let _ = tx.send(v);
            }))
            .await
            .unwrap();

        assert_eq!(next(&mut rx).await, None);
        store.set(&p("threads/t1/title"), json!("Hi")).await.unwrap();
        assert_eq!(next(&mut rx).await, Some(json!({"t1": {"title": "Hi"}})));

        // unrelated writes do not wake the subscriber
        store.set(&p("tags/g1"), json!({"id": "g1"})).await.unwrap();
        store.remove(&p("threads")).await.unwrap();
        assert_eq!(next(&mut rx).await, None);

        assert_eq!(store.active_subscriptions(), 1);
        sub.unsubscribe();
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn snapshot_round_trip_keeps_tree() {
        let store = InMemoryContentStore::new();
        store.set(&p("tags/g1"), json!({"id": "g1", "name": "Everest"})).await.unwrap();
        let restored = InMemoryContentStore::from_snapshot(store.snapshot().await, 8).unwrap();
        assert_eq!(restored.get(&p("tags/g1/name")).await.unwrap(), Some(json!("Everest")));
        assert!(InMemoryContentStore::from_snapshot(json!([1, 2]), 8).is_err());
    }
}
