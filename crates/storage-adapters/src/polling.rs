//! Poll-and-diff subscriptions for stores without native change push.
//!
//! `PollingContentStore` forwards every read and write to the wrapped store
//! and implements `subscribe` by re-reading the path on a fixed interval,
//! invoking the callback only when the value differs from the last one seen.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domains::{ChangeCallback, ContentStore, StoreError, StorePath, Subscription, WriteBatch};
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::listeners::Listeners;

pub struct PollingContentStore {
    inner: Arc<dyn ContentStore>,
    interval: Duration,
    listeners: Listeners,
}

impl PollingContentStore {
    pub fn new(inner: Arc<dyn ContentStore>, interval: Duration) -> Self {
        Self {
            inner,
            interval: interval.max(Duration::from_millis(1)),
            listeners: Listeners::default(),
        }
    }

    pub fn active_subscriptions(&self) -> usize {
        self.listeners.len()
    }
}

#[async_trait]
impl ContentStore for PollingContentStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        self.inner.get(path).await
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.inner.set(path, value).await
    }

    async fn update(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.inner.update(batch).await
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        self.inner.push(path, value).await
    }

    fn generate_key(&self) -> String {
        self.inner.generate_key()
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.inner.remove(path).await
    }

    async fn compare_and_set(
        &self,
        path: &StorePath,
        expected: Option<Value>,
        new: Option<Value>,
    ) -> Result<bool, StoreError> {
        self.inner.compare_and_set(path, expected, new).await
    }

    async fn subscribe(
        &self,
        path: &StorePath,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError> {
        // Fail fast on a bad path instead of warning on every tick.
        let initial = self.inner.get(path).await?;
        on_change(initial.clone());

        let inner = Arc::clone(&self.inner);
        let watched = path.clone();
        let period = self.interval;
        let task = tokio::spawn(async move {
            let mut last = initial;
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial value is already out.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match inner.get(&watched).await {
                    Ok(current) if current != last => {
                        on_change(current.clone());
                        last = current;
                    }
                    Ok(_) => {}
                    Err(err) => warn!(path = %watched, error = %err, "poll failed, keeping last value"),
                }
            }
        });

        debug!(path = %path, interval_ms = period.as_millis() as u64, "polling subscription registered");
        Ok(self.listeners.register(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryContentStore;
    use serde_json::json;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn emits_only_when_value_changes() {
        let backing = Arc::new(InMemoryContentStore::new());
        let store = PollingContentStore::new(backing.clone(), Duration::from_millis(10));
        let path = StorePath::parse("threads");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let sub = store
            .subscribe(&path, Box::new(move |v| {
                let _ = tx.send(v);
            }))
            .await
            .unwrap();
        assert_eq!(rx.recv().await.unwrap(), None);

        // several polls pass without a change
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        backing.set(&StorePath::parse("threads/t1/title"), json!("Hi")).await.unwrap();
        let seen = tokio::time::timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(seen, Some(json!({"t1": {"title": "Hi"}})));

        assert_eq!(store.active_subscriptions(), 1);
        sub.unsubscribe();
        assert_eq!(store.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn writes_pass_through_to_inner_store() {
        let backing = Arc::new(InMemoryContentStore::new());
        let store = PollingContentStore::new(backing.clone(), Duration::from_millis(10));
        let key = store.push(&StorePath::parse("threads"), json!({"title": "a"})).await.unwrap();
        let stored = backing.get(&StorePath::parse("threads").child(&key)).await.unwrap();
        assert_eq!(stored, Some(json!({"title": "a"})));
    }
}
