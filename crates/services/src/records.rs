//! Stored shapes of the forum entities and their mapping to domain models.
//!
//! Field names are camelCase in the store (`createdOn`, `likedBy`, ...).
//! Ids are taken from the store key, not from the optional `id` field.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use domains::{
    Comment, CommentId, Handle, NewComment, NewThread, NewUser, StoreError, StorePath, Tag, TagId,
    TagName, Thread, ThreadId, ThreadStats, ThreadSummary, User,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub(crate) fn decode<T: DeserializeOwned>(path: &StorePath, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Serialization {
        path: path.to_string(),
        source,
    })
}

pub(crate) fn encode<T: Serialize>(path: &StorePath, record: &T) -> Result<Value, StoreError> {
    serde_json::to_value(record).map_err(|source| StoreError::Serialization {
        path: path.to_string(),
        source,
    })
}

/// Number of children of a collection node; absent or non-object is empty.
pub(crate) fn child_count(value: Option<&Value>) -> usize {
    value.and_then(Value::as_object).map_or(0, Map::len)
}

/// Number of thread records in the `threads` collection. Nodes without an
/// `author` are stray children of a deleted thread and are skipped.
pub(crate) fn thread_count(value: Option<&Value>) -> usize {
    value
        .and_then(Value::as_object)
        .map_or(0, |threads| threads.values().filter(|t| t.get("author").is_some()).count())
}

/// Keys of a `{key: true}` marker set.
pub(crate) fn marker_keys(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter(|(_, v)| v.as_bool().unwrap_or(false))
            .map(|(k, _)| k)
            .collect(),
        _ => Vec::new(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ThreadRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ThreadId>,
    pub author: Handle,
    pub title: String,
    pub content: String,
    pub created_on: DateTime<Utc>,
    pub location: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub liked_by: BTreeMap<Handle, bool>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub comments: BTreeMap<CommentId, CommentRecord>,
}

impl ThreadRecord {
    pub fn new(thread: &NewThread, created_on: DateTime<Utc>) -> Self {
        Self {
            id: None,
            author: thread.author.clone(),
            title: thread.title.clone(),
            content: thread.content.clone(),
            created_on,
            location: thread.location.clone(),
            liked_by: BTreeMap::new(),
            comments: BTreeMap::new(),
        }
    }

    pub fn likers(&self) -> impl Iterator<Item = &Handle> {
        self.liked_by.iter().filter(|(_, liked)| **liked).map(|(h, _)| h)
    }

    pub fn stats(&self) -> ThreadStats {
        ThreadStats {
            comment_count: self.comments.len(),
            like_count: self.likers().count(),
        }
    }

    pub fn into_thread(self, id: ThreadId) -> Thread {
        let liked_by = self.likers().cloned().collect();
        Thread {
            id,
            author: self.author,
            title: self.title,
            content: self.content,
            created_on: self.created_on,
            location: self.location,
            liked_by,
        }
    }

    pub fn into_summary(self, id: ThreadId) -> ThreadSummary {
        let stats = self.stats();
        ThreadSummary {
            thread: self.into_thread(id),
            comment_count: stats.comment_count,
            like_count: stats.like_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommentRecord {
    pub author: Handle,
    pub text: String,
    pub created_on: DateTime<Utc>,
}

impl CommentRecord {
    pub fn new(comment: &NewComment, created_on: DateTime<Utc>) -> Self {
        Self {
            author: comment.author.clone(),
            text: comment.text.clone(),
            created_on,
        }
    }

    pub fn into_comment(self, thread_id: ThreadId, id: CommentId) -> Comment {
        Comment {
            id,
            thread_id,
            author: self.author,
            text: self.text,
            created_on: self.created_on,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TagRecord {
    pub id: TagId,
    pub name: TagName,
}

impl From<&Tag> for TagRecord {
    fn from(tag: &Tag) -> Self {
        Self { id: tag.id.clone(), name: tag.name.clone() }
    }
}

impl TagRecord {
    pub fn into_tag(self, key: &str) -> Tag {
        Tag { id: TagId::new(key), name: self.name }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserRecord {
    pub handle: Handle,
    pub uid: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_blocked: bool,
    pub created_on: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub liked_threads: BTreeMap<ThreadId, bool>,
}

impl UserRecord {
    pub fn new(user: &NewUser, created_on: DateTime<Utc>) -> Self {
        Self {
            handle: user.handle.clone(),
            uid: user.uid.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: user.email.clone(),
            is_admin: false,
            is_blocked: false,
            created_on,
            liked_threads: BTreeMap::new(),
        }
    }

    pub fn into_user(self) -> User {
        User {
            handle: self.handle,
            uid: self.uid,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            is_admin: self.is_admin,
            is_blocked: self.is_blocked,
            created_on: self.created_on,
            liked_threads: self
                .liked_threads
                .into_iter()
                .filter(|(_, liked)| *liked)
                .map(|(id, _)| id)
                .collect(),
        }
    }
}
