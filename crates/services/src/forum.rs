//! # Forum
//!
//! The calling layer over the repositories. Every mutating operation takes
//! the `Actor` it runs for and enforces the lifecycle rules:
//! - blocked actors cannot mutate anything;
//! - thread and comment text is edited by its author only;
//! - threads and comments are deleted by their author or an admin;
//! - likes always act on the actor's own handle;
//! - tags are detached by the thread's author or an admin.

use std::sync::Arc;

use domains::{
    Actor, Comment, CommentId, CommentOrder, ContentStore, DomainError, ForumPolicy, Handle, Result, Subscription,
    Tag, TagId, Thread, ThreadId, ThreadQuery, ThreadStats, ThreadSummary,
};
use tracing::warn;

use crate::comments::CommentRepository;
use crate::likes::LikeLedger;
use crate::notifier::ChangeNotifier;
use crate::tags::TagRegistry;
use crate::threads::ThreadRepository;
use crate::users::UserDirectory;

#[derive(Clone)]
pub struct Forum {
    threads: ThreadRepository,
    comments: CommentRepository,
    tags: TagRegistry,
    likes: LikeLedger,
    notifier: ChangeNotifier,
    users: UserDirectory,
}

fn ensure_active(actor: &Actor) -> Result<()> {
    if actor.is_blocked {
        warn!(handle = %actor.handle, "blocked user attempted a write");
        return Err(DomainError::Unauthorized(format!("user {} is blocked", actor.handle)));
    }
    Ok(())
}

fn ensure_author(actor: &Actor, author: &Handle, what: &str) -> Result<()> {
    if &actor.handle != author {
        return Err(DomainError::Unauthorized(format!(
            "only {author} can edit this {what}"
        )));
    }
    Ok(())
}

fn ensure_owner_or_admin(actor: &Actor, owner: &Handle, what: &str) -> Result<()> {
    if !actor.owns_or_moderates(owner) {
        return Err(DomainError::Unauthorized(format!(
            "{} is neither the author of this {what} nor an admin",
            actor.handle
        )));
    }
    Ok(())
}

impl Forum {
    pub fn new(store: Arc<dyn ContentStore>, policy: ForumPolicy) -> Self {
        let policy = Arc::new(policy);
        Self {
            threads: ThreadRepository::new(Arc::clone(&store), Arc::clone(&policy)),
            comments: CommentRepository::new(Arc::clone(&store), Arc::clone(&policy)),
            tags: TagRegistry::new(Arc::clone(&store), policy),
            likes: LikeLedger::new(Arc::clone(&store)),
            notifier: ChangeNotifier::new(Arc::clone(&store)),
            users: UserDirectory::new(store),
        }
    }

    pub fn threads(&self) -> &ThreadRepository {
        &self.threads
    }

    pub fn comments(&self) -> &CommentRepository {
        &self.comments
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    pub fn likes(&self) -> &LikeLedger {
        &self.likes
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    pub fn users(&self) -> &UserDirectory {
        &self.users
    }

    // --- threads ---

    pub async fn create_thread(&self, actor: &Actor, title: &str, content: &str, location: &str) -> Result<ThreadId> {
        ensure_active(actor)?;
        self.threads
            .create(actor.handle.as_str(), title, content, location)
            .await
    }

    pub async fn get_thread_by_id(&self, id: &ThreadId) -> Result<Thread> {
        self.threads.get_by_id(id).await
    }

    pub async fn list_threads(&self, query: &ThreadQuery) -> Result<Vec<ThreadSummary>> {
        self.threads.list(query).await
    }

    pub async fn update_thread(&self, actor: &Actor, id: &ThreadId, title: &str, content: &str) -> Result<()> {
        ensure_active(actor)?;
        let thread = self.threads.get_by_id(id).await?;
        ensure_author(actor, &thread.author, "thread")?;
        self.threads.update(id, title, content).await
    }

    pub async fn delete_thread(&self, actor: &Actor, id: &ThreadId) -> Result<()> {
        ensure_active(actor)?;
        let thread = self.threads.get_by_id(id).await?;
        ensure_owner_or_admin(actor, &thread.author, "thread")?;
        self.threads.delete(id).await
    }

    // --- likes ---

    pub async fn like_thread(&self, actor: &Actor, id: &ThreadId) -> Result<()> {
        ensure_active(actor)?;
        self.likes.like(&actor.handle, id).await
    }

    pub async fn unlike_thread(&self, actor: &Actor, id: &ThreadId) -> Result<()> {
        ensure_active(actor)?;
        self.likes.unlike(&actor.handle, id).await
    }

    /// Returns whether the actor likes the thread afterwards.
    pub async fn toggle_like(&self, actor: &Actor, id: &ThreadId) -> Result<bool> {
        ensure_active(actor)?;
        self.likes.toggle(&actor.handle, id).await
    }

    // --- comments ---

    pub async fn add_comment(&self, actor: &Actor, thread_id: &ThreadId, text: &str) -> Result<CommentId> {
        ensure_active(actor)?;
        self.comments.add(thread_id, actor.handle.as_str(), text).await
    }

    pub async fn list_comments(&self, thread_id: &ThreadId, order: CommentOrder) -> Result<Vec<Comment>> {
        self.comments.list_by_thread(thread_id, order).await
    }

    pub async fn update_comment(
        &self,
        actor: &Actor,
        thread_id: &ThreadId,
        comment_id: &CommentId,
        text: &str,
    ) -> Result<()> {
        ensure_active(actor)?;
        let comment = self.comments.get(thread_id, comment_id).await?;
        ensure_author(actor, &comment.author, "comment")?;
        self.comments.update(thread_id, comment_id, text).await
    }

    pub async fn delete_comment(&self, actor: &Actor, thread_id: &ThreadId, comment_id: &CommentId) -> Result<()> {
        ensure_active(actor)?;
        let comment = self.comments.get(thread_id, comment_id).await?;
        ensure_owner_or_admin(actor, &comment.author, "comment")?;
        self.comments.delete(thread_id, comment_id).await
    }

    // --- tags ---

    pub async fn attach_tag(&self, actor: &Actor, thread_id: &ThreadId, raw: &str) -> Result<Option<Tag>> {
        ensure_active(actor)?;
        self.tags.create_or_attach(thread_id, raw).await
    }

    /// Attaches each comma-separated name in order, stopping at the first
    /// failure. Tags attached before the failure stay attached.
    pub async fn attach_tags(&self, actor: &Actor, thread_id: &ThreadId, raw: &str) -> Result<Vec<Tag>> {
        ensure_active(actor)?;
        let mut attached = Vec::new();
        for part in raw.split(',') {
            if let Some(tag) = self.tags.create_or_attach(thread_id, part).await? {
                attached.push(tag);
            }
        }
        Ok(attached)
    }

    pub async fn detach_tag(&self, actor: &Actor, thread_id: &ThreadId, tag_id: &TagId) -> Result<()> {
        ensure_active(actor)?;
        let thread = self.threads.get_by_id(thread_id).await?;
        ensure_owner_or_admin(actor, &thread.author, "thread")?;
        self.tags.detach(thread_id, tag_id).await
    }

    pub async fn list_tags_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<Tag>> {
        self.tags.list_tags_for_thread(thread_id).await
    }

    /// Single thread/tag existence probe.
    pub async fn thread_has_tag(&self, thread_id: &ThreadId, tag_id: &TagId) -> Result<bool> {
        self.tags.has_tag(thread_id, tag_id).await
    }

    pub async fn list_threads_by_tag(&self, tag_id: &TagId) -> Result<Vec<ThreadSummary>> {
        self.tags.threads_with_tag(tag_id).await
    }

    // --- live counts ---

    pub async fn subscribe_thread_count<F>(&self, callback: F) -> Result<Subscription>
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.notifier.subscribe_thread_count(callback).await
    }

    pub async fn subscribe_thread_stats<F>(&self, thread_id: &ThreadId, callback: F) -> Result<Subscription>
    where
        F: Fn(ThreadStats) + Send + Sync + 'static,
    {
        self.notifier.subscribe_thread_stats(thread_id, callback).await
    }

    pub async fn count_threads(&self) -> Result<usize> {
        self.notifier.count_threads().await
    }

    pub async fn count_users(&self) -> Result<usize> {
        self.notifier.count_users().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::MockContentStore;
    use tokio_test::assert_err;

    fn blocked() -> Actor {
        Actor {
            handle: Handle::new("mallory").unwrap(),
            is_admin: true,
            is_blocked: true,
        }
    }

    #[tokio::test]
    async fn blocked_actor_is_rejected_before_any_store_access() {
        let mut store = MockContentStore::new();
        store.expect_get().never();
        store.expect_push().never();
        store.expect_update().never();
        let forum = Forum::new(Arc::new(store), ForumPolicy::default());
        let thread = ThreadId::new("t1");

        let err = assert_err!(forum.create_thread(&blocked(), "Everest Trip", "Amazing climb", "Nepal").await);
        assert_eq!(err.kind(), domains::ErrorKind::Authorization);
        assert_err!(forum.like_thread(&blocked(), &thread).await);
        assert_err!(forum.toggle_like(&blocked(), &thread).await);
        assert_err!(forum.add_comment(&blocked(), &thread, "Nice!").await);
        assert_err!(forum.attach_tags(&blocked(), &thread, "a,b").await);
        assert_err!(forum.delete_thread(&blocked(), &thread).await);
    }

    #[test]
    fn authorship_rules() {
        let alice = Handle::new("alice").unwrap();
        let bob = Handle::new("bob").unwrap();
        let admin = Actor::admin(bob.clone());

        assert!(ensure_author(&Actor::member(alice.clone()), &alice, "thread").is_ok());
        // admins moderate but do not edit other people's text
        assert!(ensure_author(&admin, &alice, "thread").is_err());
        assert!(ensure_owner_or_admin(&admin, &alice, "thread").is_ok());
        assert!(ensure_owner_or_admin(&Actor::member(bob), &alice, "comment").is_err());
    }
}
