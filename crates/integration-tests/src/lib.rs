//! Shared fixtures for the integration test targets.
//!
//! `TestForum` wires a `Forum` over a fresh `InMemoryContentStore` and
//! registers a small cast of users: three members and one admin.
//! `SlowStore` stretches every store round trip so concurrent callers
//! actually interleave between their reads and their writes.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domains::{
    Actor, ChangeCallback, ContentStore, ForumPolicy, NewUser, StoreError, StorePath, Subscription, ThreadId,
    WriteBatch,
};
use serde_json::Value;
use services::Forum;
use storage_adapters::InMemoryContentStore;
use tokio::sync::mpsc;

pub struct TestForum {
    pub store: Arc<InMemoryContentStore>,
    pub forum: Forum,
    pub alice: Actor,
    pub bob: Actor,
    pub carol: Actor,
    pub admin: Actor,
}

impl TestForum {
    pub async fn new() -> Self {
        Self::with_policy(ForumPolicy::default()).await
    }

    pub async fn with_policy(policy: ForumPolicy) -> Self {
        let store = Arc::new(InMemoryContentStore::new());
        Self::over(store, policy).await
    }

    /// Builds the fixture over an existing store, e.g. one restored from a snapshot.
    pub async fn over(store: Arc<InMemoryContentStore>, policy: ForumPolicy) -> Self {
        let backend: Arc<dyn ContentStore> = store.clone();
        Self::assemble(store, backend, policy).await
    }

    /// Forum whose store calls each take at least `delay`. `store` still
    /// reads the underlying memory directly.
    pub async fn slow(policy: ForumPolicy, delay: Duration) -> Self {
        let store = Arc::new(InMemoryContentStore::new());
        let backend: Arc<dyn ContentStore> = Arc::new(SlowStore::new(store.clone(), delay));
        Self::assemble(store, backend, policy).await
    }

    async fn assemble(store: Arc<InMemoryContentStore>, backend: Arc<dyn ContentStore>, policy: ForumPolicy) -> Self {
        let forum = Forum::new(backend, policy);
        let alice = register(&forum, "alice").await;
        let bob = register(&forum, "bob").await;
        let carol = register(&forum, "carol").await;
        let moderator = register(&forum, "mod").await;
        forum
            .users()
            .set_admin(&moderator.handle, true)
            .await
            .expect("promote moderator");
        let admin = forum
            .users()
            .actor_for_uid("uid-mod")
            .await
            .expect("resolve moderator");

        Self { store, forum, alice, bob, carol, admin }
    }

    /// Creates a valid thread authored by `actor`.
    pub async fn thread(&self, actor: &Actor, title: &str) -> ThreadId {
        self.forum
            .create_thread(actor, title, "Amazing climb", "Nepal")
            .await
            .expect("create thread")
    }

    /// Raw value at `path`, bypassing the services.
    pub async fn raw(&self, path: &str) -> Option<Value> {
        self.store
            .get(&domains::StorePath::parse(path))
            .await
            .expect("raw read")
    }
}

/// Delegates to an in-memory store after sleeping for `delay`.
pub struct SlowStore {
    inner: Arc<InMemoryContentStore>,
    delay: Duration,
}

impl SlowStore {
    pub fn new(inner: Arc<InMemoryContentStore>, delay: Duration) -> Self {
        Self { inner, delay }
    }

    async fn pause(&self) {
        tokio::time::sleep(self.delay).await;
    }
}

#[async_trait]
impl ContentStore for SlowStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>, StoreError> {
        self.pause().await;
        self.inner.get(path).await
    }

    async fn set(&self, path: &StorePath, value: Value) -> Result<(), StoreError> {
        self.pause().await;
        self.inner.set(path, value).await
    }

    async fn update(&self, batch: WriteBatch) -> Result<(), StoreError> {
        self.pause().await;
        self.inner.update(batch).await
    }

    async fn push(&self, path: &StorePath, value: Value) -> Result<String, StoreError> {
        self.pause().await;
        self.inner.push(path, value).await
    }

    fn generate_key(&self) -> String {
        self.inner.generate_key()
    }

    async fn remove(&self, path: &StorePath) -> Result<(), StoreError> {
        self.pause().await;
        self.inner.remove(path).await
    }

    async fn compare_and_set(
        &self,
        path: &StorePath,
        expected: Option<Value>,
        new: Option<Value>,
    ) -> Result<bool, StoreError> {
        self.pause().await;
        self.inner.compare_and_set(path, expected, new).await
    }

    async fn subscribe(&self, path: &StorePath, on_change: ChangeCallback) -> Result<Subscription, StoreError> {
        self.inner.subscribe(path, on_change).await
    }
}

pub async fn register(forum: &Forum, handle: &str) -> Actor {
    let user = NewUser::new(
        handle,
        &format!("uid-{handle}"),
        handle,
        "Tester",
        &format!("{handle}@example.com"),
    )
    .expect("valid user");
    let user = forum.users().register(user).await.expect("register user");
    Actor::from(&user)
}

/// Channel-backed callback sink for subscription tests.
pub fn sink<T: Send + 'static>() -> (impl Fn(T) + Send + Sync + 'static, mpsc::UnboundedReceiver<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (move |value: T| {
        let _ = tx.send(value);
    }, rx)
}

/// Receives until `pred` matches, failing after a second.
pub async fn recv_until<T>(rx: &mut mpsc::UnboundedReceiver<T>, pred: impl Fn(&T) -> bool) -> T {
    tokio::time::timeout(Duration::from_secs(1), async {
        loop {
            match rx.recv().await {
                Some(value) if pred(&value) => return value,
                Some(_) => continue,
                None => panic!("subscription closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}
