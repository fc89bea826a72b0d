//! # Thread Repository
//!
//! Owns thread documents. Listing derives comment and like counts from the
//! nested collections; deletion cascades to comments, likes (both sides of
//! the ledger) and tag associations in one atomic update.

use std::sync::Arc;

use chrono::Utc;
use domains::{
    paths, ContentStore, DomainError, ForumPolicy, ListingPolicy, NewThread, Result, Thread, ThreadEdit,
    ThreadId, ThreadQuery, ThreadSort, ThreadStats, ThreadSummary, WriteBatch,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::records::{decode, encode, thread_count, ThreadRecord};

/// True when a thread record exists at `id`. Nodes holding only stray
/// children (e.g. a like written after a delete) do not count.
pub(crate) async fn thread_exists(store: &dyn ContentStore, id: &ThreadId) -> Result<bool> {
    Ok(store.get(&paths::thread_field(id, "author")).await?.is_some())
}

pub(crate) async fn ensure_thread(store: &dyn ContentStore, id: &ThreadId) -> Result<()> {
    if thread_exists(store, id).await? {
        Ok(())
    } else {
        Err(DomainError::not_found("Thread", id))
    }
}

#[derive(Clone)]
pub struct ThreadRepository {
    store: Arc<dyn ContentStore>,
    policy: Arc<ForumPolicy>,
}

impl ThreadRepository {
    pub fn new(store: Arc<dyn ContentStore>, policy: Arc<ForumPolicy>) -> Self {
        Self { store, policy }
    }

    /// Validates the fields and persists a new thread under a store-generated
    /// id. The record, `id` field included, lands in a single write.
    pub async fn create(&self, author: &str, title: &str, content: &str, location: &str) -> Result<ThreadId> {
        let thread = NewThread::new(author, title, content, location, &self.policy.validation)?;
        let id = ThreadId::new(self.store.generate_key());
        let path = paths::thread(&id);

        let mut record = ThreadRecord::new(&thread, Utc::now());
        record.id = Some(id.clone());
        self.store.set(&path, encode(&path, &record)?).await?;

        info!(thread_id = %id, author = %thread.author, "thread created");
        Ok(id)
    }

    pub async fn exists(&self, id: &ThreadId) -> Result<bool> {
        thread_exists(self.store.as_ref(), id).await
    }

    async fn load(&self, id: &ThreadId) -> Result<ThreadRecord> {
        let path = paths::thread(id);
        match self.store.get(&path).await? {
            Some(value) if value.get("author").is_some() => Ok(decode(&path, value)?),
            _ => Err(DomainError::not_found("Thread", id)),
        }
    }

    pub async fn get_by_id(&self, id: &ThreadId) -> Result<Thread> {
        Ok(self.load(id).await?.into_thread(id.clone()))
    }

    pub async fn stats(&self, id: &ThreadId) -> Result<ThreadStats> {
        Ok(self.load(id).await?.stats())
    }

    /// All threads with derived counts, filtered and sorted per `query`.
    pub async fn list(&self, query: &ThreadQuery) -> Result<Vec<ThreadSummary>> {
        let threads = self.all().await?;
        let total = threads.len();
        let threads = apply_query(threads, query, &self.policy.listing);
        debug!(total, returned = threads.len(), ?query, "listed threads");
        Ok(threads)
    }

    /// Every decodable thread in store key order.
    pub(crate) async fn all(&self) -> Result<Vec<ThreadSummary>> {
        let collection = paths::threads();
        let Some(Value::Object(threads)) = self.store.get(&collection).await? else {
            return Ok(Vec::new());
        };

        let mut summaries = Vec::with_capacity(threads.len());
        for (key, value) in threads {
            let path = collection.child(&key);
            match decode::<ThreadRecord>(&path, value) {
                Ok(record) => summaries.push(record.into_summary(ThreadId::new(key))),
                Err(err) => warn!(error = %err, "skipping malformed thread record"),
            }
        }
        Ok(summaries)
    }

    /// Replaces title and content. Ownership is checked by the caller.
    pub async fn update(&self, id: &ThreadId, title: &str, content: &str) -> Result<()> {
        let edit = ThreadEdit::new(title, content, &self.policy.validation)?;
        ensure_thread(self.store.as_ref(), id).await?;

        let batch = WriteBatch::new()
            .set(paths::thread_field(id, "title"), edit.title)
            .set(paths::thread_field(id, "content"), edit.content);
        self.store.update(batch).await?;

        info!(thread_id = %id, "thread updated");
        Ok(())
    }

    /// Removes the thread with its comments and likes, the mirrored
    /// `likedThreads` entries of its likers, and its tag associations.
    /// Registry tags are left alone. Authorization is the caller's job.
    pub async fn delete(&self, id: &ThreadId) -> Result<()> {
        let record = self.load(id).await?;

        let mut batch = WriteBatch::new()
            .delete(paths::thread(id))
            .delete(paths::post_tags(id));
        for handle in record.likers() {
            batch.put(paths::user_liked_thread(handle, id), None);
        }
        self.store.update(batch).await?;

        let stats = record.stats();
        info!(
            thread_id = %id,
            comments = stats.comment_count,
            likes = stats.like_count,
            "thread deleted"
        );
        Ok(())
    }

    /// Number of thread records; stray nodes without an author are not counted.
    pub async fn count(&self) -> Result<usize> {
        Ok(thread_count(self.store.get(&paths::threads()).await?.as_ref()))
    }
}

fn title_matches(summary: &ThreadSummary, term: &str) -> bool {
    summary.thread.title.to_lowercase().contains(term)
}

fn author_matches(summary: &ThreadSummary, term: &str) -> bool {
    summary.thread.author.as_str().to_lowercase().contains(term)
}

/// Filters and sorts a listing.
///
/// Unless `combine_filters` is set, a search term wins over the author
/// filter, and a filtered listing keeps store order.
pub(crate) fn apply_query(
    mut threads: Vec<ThreadSummary>,
    query: &ThreadQuery,
    listing: &ListingPolicy,
) -> Vec<ThreadSummary> {
    let search = query.search.as_deref().map(str::to_lowercase);
    let author = query.author.as_deref().map(str::to_lowercase);

    if listing.combine_filters {
        threads.retain(|t| {
            search.as_deref().map_or(true, |term| title_matches(t, term))
                && author.as_deref().map_or(true, |term| author_matches(t, term))
        });
        sort_threads(&mut threads, query.sort);
        return threads;
    }

    if let Some(term) = search.as_deref() {
        threads.retain(|t| title_matches(t, term));
        return threads;
    }
    if let Some(term) = author.as_deref() {
        threads.retain(|t| author_matches(t, term));
        return threads;
    }
    sort_threads(&mut threads, query.sort);
    threads
}

fn sort_threads(threads: &mut [ThreadSummary], sort: ThreadSort) {
    match sort {
        ThreadSort::Insertion => {}
        ThreadSort::Date => threads.sort_by(|a, b| b.thread.created_on.cmp(&a.thread.created_on)),
        ThreadSort::Title => threads.sort_by(|a, b| {
            a.thread
                .title
                .to_lowercase()
                .cmp(&b.thread.title.to_lowercase())
                .then_with(|| a.thread.title.cmp(&b.thread.title))
        }),
    }
}
