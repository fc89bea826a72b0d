use std::sync::Arc;

use chrono::Utc;
use domains::{
    paths, Comment, CommentId, CommentOrder, ContentStore, DomainError, ForumPolicy, NewComment, Result, ThreadId,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::records::{decode, encode, CommentRecord};
use crate::threads::ensure_thread;

/// Comments live nested under their thread, so thread deletion removes them
/// with the same write.
#[derive(Clone)]
pub struct CommentRepository {
    store: Arc<dyn ContentStore>,
    policy: Arc<ForumPolicy>,
}

impl CommentRepository {
    pub fn new(store: Arc<dyn ContentStore>, policy: Arc<ForumPolicy>) -> Self {
        Self { store, policy }
    }

    pub async fn add(&self, thread_id: &ThreadId, author: &str, text: &str) -> Result<CommentId> {
        let comment = NewComment::new(author, text, &self.policy.validation)?;
        ensure_thread(self.store.as_ref(), thread_id).await?;

        let collection = paths::comments(thread_id);
        let record = encode(&collection, &CommentRecord::new(&comment, Utc::now()))?;
        let id = CommentId::new(self.store.push(&collection, record).await?);

        info!(thread_id = %thread_id, comment_id = %id, author = %comment.author, "comment added");
        Ok(id)
    }

    /// Comments ordered by `createdOn`; ties fall back to key order.
    /// A missing thread has no comments.
    pub async fn list_by_thread(&self, thread_id: &ThreadId, order: CommentOrder) -> Result<Vec<Comment>> {
        let collection = paths::comments(thread_id);
        let Some(Value::Object(entries)) = self.store.get(&collection).await? else {
            return Ok(Vec::new());
        };

        let mut comments = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match decode::<CommentRecord>(&collection.child(&key), value) {
                Ok(record) => comments.push(record.into_comment(thread_id.clone(), CommentId::new(key))),
                Err(err) => warn!(thread_id = %thread_id, error = %err, "skipping malformed comment"),
            }
        }

        comments.sort_by(|a, b| a.created_on.cmp(&b.created_on).then_with(|| a.id.cmp(&b.id)));
        if order == CommentOrder::Newest {
            comments.reverse();
        }
        Ok(comments)
    }

    pub async fn get(&self, thread_id: &ThreadId, id: &CommentId) -> Result<Comment> {
        let path = paths::comment(thread_id, id);
        let value = self
            .store
            .get(&path)
            .await?
            .ok_or_else(|| DomainError::not_found("Comment", id))?;
        let record: CommentRecord = decode(&path, value)?;
        Ok(record.into_comment(thread_id.clone(), id.clone()))
    }

    /// Replaces the text. Author and timestamp are kept.
    pub async fn update(&self, thread_id: &ThreadId, id: &CommentId, text: &str) -> Result<()> {
        let text = NewComment::text(text, &self.policy.validation)?;
        self.get(thread_id, id).await?;

        let path = paths::comment(thread_id, id).child("text");
        self.store.set(&path, Value::String(text)).await?;
        info!(thread_id = %thread_id, comment_id = %id, "comment updated");
        Ok(())
    }

    pub async fn delete(&self, thread_id: &ThreadId, id: &CommentId) -> Result<()> {
        self.get(thread_id, id).await?;
        self.store.remove(&paths::comment(thread_id, id)).await?;
        info!(thread_id = %thread_id, comment_id = %id, "comment deleted");
        Ok(())
    }
}
