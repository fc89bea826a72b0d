//! # Tag Registry & Post-Tag Association
//!
//! Tags are global, deduplicated by name and never deleted. Threads reference
//! them through `postTags/{threadId}/{tagId}` markers, capped per thread.
//!
//! Name lookups go through `tagIndex/{digest}`, the SHA-256 of the name's
//! match key, and fall back to scanning the registry so entries indexed
//! under another matching policy are still found.
//!
//! In the default mode attachment is a read followed by a conditional write,
//! so two concurrent callers can create duplicate tags or push a thread past
//! its cap. With `tags.strict` the index and the association set are claimed
//! through `compare_and_set` instead and conflicts are retried.

use std::sync::Arc;

use domains::{
    paths, ContentStore, DomainError, ForumPolicy, Result, StoreError, StorePath, Tag, TagId, TagName, ThreadId,
    ThreadSummary, WriteBatch,
};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::records::{decode, encode, marker_keys, TagRecord};
use crate::threads::{ensure_thread, ThreadRepository};

#[derive(Clone)]
pub struct TagRegistry {
    store: Arc<dyn ContentStore>,
    policy: Arc<ForumPolicy>,
    threads: ThreadRepository,
}

impl TagRegistry {
    pub fn new(store: Arc<dyn ContentStore>, policy: Arc<ForumPolicy>) -> Self {
        let threads = ThreadRepository::new(Arc::clone(&store), Arc::clone(&policy));
        Self { store, policy, threads }
    }

    /// Associates the tag named by `raw` with the thread, creating the tag
    /// on first use. Returns `None` when `raw` is blank.
    pub async fn create_or_attach(&self, thread_id: &ThreadId, raw: &str) -> Result<Option<Tag>> {
        let Some(name) = TagName::parse(raw, &self.policy.validation)? else {
            debug!(thread_id = %thread_id, "ignoring blank tag text");
            return Ok(None);
        };
        ensure_thread(self.store.as_ref(), thread_id).await?;
        self.check_cap(thread_id, self.association_count(thread_id).await?)?;

        let tag = if self.policy.tags.strict {
            self.attach_strict(thread_id, &name).await?
        } else {
            self.attach_lax(thread_id, name).await?
        };
        Ok(Some(tag))
    }

    async fn attach_lax(&self, thread_id: &ThreadId, name: TagName) -> Result<Tag> {
        if let Some(tag) = self.lookup(&name).await? {
            if self.has_tag(thread_id, &tag.id).await? {
                debug!(thread_id = %thread_id, tag_id = %tag.id, "tag already attached");
            } else {
                self.store.set(&paths::post_tag(thread_id, &tag.id), Value::Bool(true)).await?;
                info!(thread_id = %thread_id, tag_id = %tag.id, name = %tag.name, "tag attached");
            }
            return Ok(tag);
        }

        let tag = Tag { id: TagId::new(self.store.generate_key()), name };
        let path = paths::tag(&tag.id);
        let batch = WriteBatch::new()
            .set(path.clone(), encode(&path, &TagRecord::from(&tag))?)
            .set(self.index_path(&tag.name), Value::String(tag.id.to_string()))
            .set(paths::post_tag(thread_id, &tag.id), true);
        self.store.update(batch).await?;

        info!(thread_id = %thread_id, tag_id = %tag.id, name = %tag.name, "tag created and attached");
        Ok(tag)
    }

    /// Attaches with compare-and-set on both the association set and the
    /// name index.
    ///
    /// A new tag's association is claimed before its registry entry, so a
    /// cap rejection leaves nothing behind. The registry entry is written
    /// only after its index slot is won; a caller that loses the slot drops
    /// its own marker and retries with the winner.
    async fn attach_strict(&self, thread_id: &ThreadId, name: &TagName) -> Result<Tag> {
        let attempts = self.policy.tags.max_cas_attempts;

        for attempt in 1..=attempts {
            let index = self.index_path(name);
            let observed = self.store.get(&index).await?;
            let existing = match self.claimed(name, observed.as_ref()).await? {
                Some(tag) => Some(tag),
                // An entry missing from the index is adopted rather than duplicated.
                None => self.scan(name).await?,
            };
            if let Some(tag) = existing {
                self.associate_strict(thread_id, &tag).await?;
                info!(thread_id = %thread_id, tag_id = %tag.id, name = %tag.name, "tag attached");
                return Ok(tag);
            }

            let candidate = Tag { id: TagId::new(self.store.generate_key()), name: name.clone() };
            self.associate_strict(thread_id, &candidate).await?;

            let claim = Some(Value::String(candidate.id.to_string()));
            if self.store.compare_and_set(&index, observed, claim).await? {
                let path = paths::tag(&candidate.id);
                self.store.set(&path, encode(&path, &TagRecord::from(&candidate))?).await?;
                info!(thread_id = %thread_id, tag_id = %candidate.id, name = %candidate.name, "tag created and attached");
                return Ok(candidate);
            }

            self.store.remove(&paths::post_tag(thread_id, &candidate.id)).await?;
            debug!(name = %name, attempt, "tag index claimed concurrently, retrying");
        }

        Err(StoreError::Conflict { path: self.index_path(name).to_string(), attempts }.into())
    }

    /// The tag an index slot holding `observed` stands for. A slot whose
    /// registry entry is not written yet belongs to an in-flight creator and
    /// is adopted as is; a slot pointing at a differently named entry is
    /// stale and yields `None`.
    async fn claimed(&self, name: &TagName, observed: Option<&Value>) -> Result<Option<Tag>> {
        let Some(Value::String(id)) = observed else {
            return Ok(None);
        };
        let id = TagId::new(id.as_str());
        match self.find(&id).await? {
            Some(tag) if self.same_name(&tag.name, name) => Ok(Some(tag)),
            Some(_) => Ok(None),
            None => Ok(Some(Tag { id, name: name.clone() })),
        }
    }

    /// Adds the association by rewriting the thread's marker set with
    /// compare-and-set, re-checking the cap against each observed set.
    async fn associate_strict(&self, thread_id: &ThreadId, tag: &Tag) -> Result<()> {
        let path = paths::post_tags(thread_id);
        let attempts = self.policy.tags.max_cas_attempts;

        for attempt in 1..=attempts {
            let observed = self.store.get(&path).await?;
            let attached = marker_keys(observed.clone());
            if attached.iter().any(|id| id == tag.id.as_str()) {
                debug!(thread_id = %thread_id, tag_id = %tag.id, "tag already attached");
                return Ok(());
            }
            self.check_cap(thread_id, attached.len())?;

            let mut markers = observed.as_ref().and_then(Value::as_object).cloned().unwrap_or_else(Map::new);
            markers.insert(tag.id.to_string(), Value::Bool(true));
            if self
                .store
                .compare_and_set(&path, observed, Some(Value::Object(markers)))
                .await?
            {
                debug!(thread_id = %thread_id, tag_id = %tag.id, "association claimed");
                return Ok(());
            }
            debug!(thread_id = %thread_id, attempt, "association set changed concurrently, retrying");
        }

        Err(StoreError::Conflict { path: path.to_string(), attempts }.into())
    }

    fn check_cap(&self, thread_id: &ThreadId, count: usize) -> Result<()> {
        let max = self.policy.tags.max_per_thread;
        if count >= max {
            return Err(DomainError::LimitExceeded(format!(
                "thread {thread_id} already has {count} tags (max {max})"
            )));
        }
        Ok(())
    }

    fn index_path(&self, name: &TagName) -> StorePath {
        let key = self.policy.tags.matching.key(name.as_str());
        paths::tag_index(&hex::encode(Sha256::digest(key.as_bytes())))
    }

    fn same_name(&self, a: &TagName, b: &TagName) -> bool {
        let matching = self.policy.tags.matching;
        matching.key(a.as_str()) == matching.key(b.as_str())
    }

    async fn lookup(&self, name: &TagName) -> Result<Option<Tag>> {
        match self.lookup_indexed(name).await? {
            Some(tag) => Ok(Some(tag)),
            None => self.scan(name).await,
        }
    }

    async fn lookup_indexed(&self, name: &TagName) -> Result<Option<Tag>> {
        let Some(Value::String(id)) = self.store.get(&self.index_path(name)).await? else {
            return Ok(None);
        };
        match self.find(&TagId::new(id)).await? {
            Some(tag) if self.same_name(&tag.name, name) => Ok(Some(tag)),
            _ => Ok(None),
        }
    }

    /// Registry scan; the earliest created entry wins if duplicates exist.
    async fn scan(&self, name: &TagName) -> Result<Option<Tag>> {
        Ok(self.list_all().await?.into_iter().find(|tag| self.same_name(&tag.name, name)))
    }

    async fn find(&self, id: &TagId) -> Result<Option<Tag>> {
        let path = paths::tag(id);
        match self.store.get(&path).await? {
            Some(value) => Ok(Some(decode::<TagRecord>(&path, value)?.into_tag(id.as_str()))),
            None => Ok(None),
        }
    }

    pub async fn get(&self, id: &TagId) -> Result<Tag> {
        self.find(id).await?.ok_or_else(|| DomainError::not_found("Tag", id))
    }

    pub async fn find_by_name(&self, raw: &str) -> Result<Option<Tag>> {
        match TagName::parse(raw, &self.policy.validation)? {
            Some(name) => self.lookup(&name).await,
            None => Ok(None),
        }
    }

    /// All registry entries in key order.
    pub async fn list_all(&self) -> Result<Vec<Tag>> {
        let collection = paths::tags();
        let Some(Value::Object(entries)) = self.store.get(&collection).await? else {
            return Ok(Vec::new());
        };
        let mut tags = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match decode::<TagRecord>(&collection.child(&key), value) {
                Ok(record) => tags.push(record.into_tag(&key)),
                Err(err) => warn!(error = %err, "skipping malformed tag record"),
            }
        }
        Ok(tags)
    }

    /// Tags associated with the thread. Associations to missing registry
    /// entries are skipped.
    pub async fn list_tags_for_thread(&self, thread_id: &ThreadId) -> Result<Vec<Tag>> {
        let ids = marker_keys(self.store.get(&paths::post_tags(thread_id)).await?);
        let mut tags = Vec::with_capacity(ids.len());
        for id in ids.into_iter().map(TagId::new) {
            match self.find(&id).await? {
                Some(tag) => tags.push(tag),
                None => warn!(thread_id = %thread_id, tag_id = %id, "association references a missing tag"),
            }
        }
        Ok(tags)
    }

    pub async fn has_tag(&self, thread_id: &ThreadId, tag_id: &TagId) -> Result<bool> {
        let marker = self.store.get(&paths::post_tag(thread_id, tag_id)).await?;
        Ok(marker.as_ref().and_then(Value::as_bool).unwrap_or(false))
    }

    /// Threads carrying `tag_id`, found by probing every thread.
    pub async fn threads_with_tag(&self, tag_id: &TagId) -> Result<Vec<ThreadSummary>> {
        let mut tagged = Vec::new();
        for summary in self.threads.all().await? {
            if self.has_tag(&summary.thread.id, tag_id).await? {
                tagged.push(summary);
            }
        }
        debug!(tag_id = %tag_id, matches = tagged.len(), "probed threads for tag");
        Ok(tagged)
    }

    /// Removes the association only; the registry entry stays.
    pub async fn detach(&self, thread_id: &ThreadId, tag_id: &TagId) -> Result<()> {
        self.store.remove(&paths::post_tag(thread_id, tag_id)).await?;
        info!(thread_id = %thread_id, tag_id = %tag_id, "tag detached");
        Ok(())
    }

    /// Number of attached tags, counted the same way as the listing.
    pub async fn association_count(&self, thread_id: &ThreadId) -> Result<usize> {
        Ok(marker_keys(self.store.get(&paths::post_tags(thread_id)).await?).len())
    }
}
