//! # Core Traits (Ports)
//!
//! The content layer talks to its hierarchical key-value store only through
//! `ContentStore`. Any adapter must implement it to be injected into the
//! services.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::StoreError;

/// Slash-separated location in the store tree. The empty path is the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StorePath(Vec<String>);

impl StorePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Splits on `/`, ignoring empty segments.
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn child(&self, segment: impl AsRef<str>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.as_ref().to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment, i.e. the key of the node this path addresses.
    pub fn key(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    pub fn starts_with(&self, prefix: &StorePath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// True when one path is an ancestor of (or equal to) the other, i.e. a
    /// write at one changes the value observed at the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self.starts_with(other) || other.starts_with(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}

/// A set of path writes applied atomically by `ContentStore::update`.
/// `None` deletes the subtree at that path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: BTreeMap<StorePath, Option<Value>>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, path: StorePath, value: impl Into<Value>) -> Self {
        self.writes.insert(path, Some(value.into()));
        self
    }

    pub fn delete(mut self, path: StorePath) -> Self {
        self.writes.insert(path, None);
        self
    }

    pub fn put(&mut self, path: StorePath, value: Option<Value>) {
        self.writes.insert(path, value);
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &StorePath> {
        self.writes.keys()
    }

    pub fn get(&self, path: &StorePath) -> Option<&Option<Value>> {
        self.writes.get(path)
    }

    /// First pair of listed paths where one contains the other.
    pub fn find_overlap(&self) -> Option<(&StorePath, &StorePath)> {
        let paths: Vec<&StorePath> = self.writes.keys().collect();
        // Sorted order puts every ancestor directly before its first descendant.
        paths
            .windows(2)
            .find(|pair| pair[1].starts_with(pair[0]))
            .map(|pair| (pair[0], pair[1]))
    }
}

impl IntoIterator for WriteBatch {
    type Item = (StorePath, Option<Value>);
    type IntoIter = std::collections::btree_map::IntoIter<StorePath, Option<Value>>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.into_iter()
    }
}

/// Invoked with the current value at the subscribed path (`None` = absent).
pub type ChangeCallback = Box<dyn Fn(Option<Value>) + Send + Sync>;

/// Cancellation handle for a standing subscription.
///
/// `unsubscribe` consumes the handle, so it can run at most once. A handle
/// that is dropped without being unsubscribed releases the listener too.
#[must_use = "dropping a Subscription cancels it"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self { cancel: Some(Box::new(cancel)) }
    }

    /// Stops the callbacks and releases the underlying listener.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Hierarchical key-value store with atomic multi-path writes and change
/// subscriptions.
///
/// Writing `null` or an empty object anywhere deletes that node; parents
/// left without children disappear as well.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Current value at `path`, or `None` when absent.
    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError>;

    /// Overwrites the value at `path`.
    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError>;

    /// Applies every write in the batch or none of them.
    /// Batches listing overlapping paths are rejected.
    async fn update(&self, batch: WriteBatch) -> Result<(), StoreError>;

    /// Stores `value` under a freshly generated key below `path` and returns the key.
    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError>;

    /// A fresh, unique, time-ordered key without writing anything.
    fn generate_key(&self) -> String;

    /// Deletes the subtree at `path`. Removing an absent path is not an error.
    async fn remove(&self, path: &StorePath) -> Result<(), StoreError>;

    /// Replaces the value at `path` with `new` only if it currently equals
    /// `expected`. Returns whether the write happened.
    async fn compare_and_set(
        &self,
        path: &StorePath,
        expected: Option<Value>,
        new: Option<Value>,
    ) -> Result<bool, StoreError>;

    /// Calls `on_change` with the current value, then again after every
    /// mutation affecting `path`, until the returned handle is released.
    async fn subscribe(
        &self,
        path: &StorePath,
        on_change: ChangeCallback,
    ) -> Result<Subscription, StoreError>;
}
