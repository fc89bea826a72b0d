//! # Domain Models
//!
//! These structs represent the core entities of the forum content layer.
//! Constructors for user-supplied input (`NewThread`, `NewComment`,
//! `TagName`, `NewUser`) enforce the field rules at creation time, so a
//! value of these types is always valid to persist.

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, Result};
use crate::policy::{FieldBounds, ValidationRules};

macro_rules! store_key {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

store_key!(
    /// Store-generated key of a thread. Assigned once at creation, never reused.
    ThreadId
);
store_key!(
    /// Store-generated key of a comment, unique within its thread only.
    CommentId
);
store_key!(
    /// Store-generated key of a global tag registry entry.
    TagId
);

/// Trims `raw` and checks it against `bounds`.
fn bounded(field: &str, raw: &str, bounds: FieldBounds) -> Result<String> {
    let value = raw.trim();
    bounds.check(field, value)?;
    Ok(value.to_string())
}

/// A user's unique, human-chosen identifier. Doubles as a store path
/// segment, so reserved path characters are rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle(String);

impl Handle {
    pub fn new(raw: &str) -> Result<Self> {
        let handle = raw.trim();
        if handle.is_empty() {
            return Err(DomainError::Validation("handle must not be empty".into()));
        }
        if let Some(c) = handle
            .chars()
            .find(|c| matches!(c, '/' | '.' | '#' | '$' | '[' | ']') || c.is_control())
        {
            return Err(DomainError::Validation(format!(
                "handle `{handle}` contains reserved character {c:?}"
            )));
        }
        Ok(Self(handle.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Handle {
    type Error = DomainError;

    fn try_from(raw: String) -> Result<Self> {
        Self::new(&raw)
    }
}

impl From<Handle> for String {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A top-level discussion post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    pub author: Handle,
    pub title: String,
    pub content: String,
    pub created_on: DateTime<Utc>,
    pub location: String,
    /// Materialized from the keys of the stored like map.
    pub liked_by: BTreeSet<Handle>,
}

impl Thread {
    pub fn like_count(&self) -> usize {
        self.liked_by.len()
    }

    pub fn is_liked_by(&self, handle: &Handle) -> bool {
        self.liked_by.contains(handle)
    }
}

/// A thread annotated with its derived counts, as returned by listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    #[serde(flatten)]
    pub thread: Thread,
    pub comment_count: usize,
    pub like_count: usize,
}

/// Live aggregate counts for a single thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadStats {
    pub comment_count: usize,
    pub like_count: usize,
}

/// Validated input for thread creation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct NewThread {
    pub author: Handle,
    pub title: String,
    pub content: String,
    pub location: String,
}

impl NewThread {
    pub fn new(
        author: &str,
        title: &str,
        content: &str,
        location: &str,
        rules: &ValidationRules,
    ) -> Result<Self> {
        Ok(Self {
            author: Handle::new(author)?,
            title: bounded("title", title, rules.title)?,
            content: bounded("content", content, rules.content)?,
            location: bounded("location", location, rules.location)?,
        })
    }
}

/// Validated replacement title and content for an existing thread.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct ThreadEdit {
    pub title: String,
    pub content: String,
}

impl ThreadEdit {
    pub fn new(title: &str, content: &str, rules: &ValidationRules) -> Result<Self> {
        Ok(Self {
            title: bounded("title", title, rules.title)?,
            content: bounded("content", content, rules.content)?,
        })
    }
}

/// A reply nested under a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub thread_id: ThreadId,
    pub author: Handle,
    pub text: String,
    pub created_on: DateTime<Utc>,
}

/// Validated input for a new comment. `createdOn` is stamped at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct NewComment {
    pub author: Handle,
    pub text: String,
}

impl NewComment {
    pub fn new(author: &str, text: &str, rules: &ValidationRules) -> Result<Self> {
        Ok(Self {
            author: Handle::new(author)?,
            text: Self::text(text, rules)?,
        })
    }

    /// Validates replacement text for an existing comment.
    pub fn text(raw: &str, rules: &ValidationRules) -> Result<String> {
        bounded("comment", raw, rules.comment)
    }
}

/// Canonical (trimmed) tag name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagName(String);

impl TagName {
    /// Returns `Ok(None)` when `raw` trims to nothing.
    pub fn parse(raw: &str, rules: &ValidationRules) -> Result<Option<Self>> {
        let name = raw.trim();
        if name.is_empty() {
            return Ok(None);
        }
        rules.tag.check("tag", name)?;
        Ok(Some(Self(name.to_string())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A canonical label in the global registry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: TagId,
    pub name: TagName,
}

/// A registered forum member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub handle: Handle,
    /// Identity-provider uid this handle is bound to.
    pub uid: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub is_admin: bool,
    pub is_blocked: bool,
    pub created_on: DateTime<Utc>,
    pub liked_threads: BTreeSet<ThreadId>,
}

/// Validated registration input.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct NewUser {
    pub handle: Handle,
    pub uid: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl NewUser {
    pub fn new(handle: &str, uid: &str, first_name: &str, last_name: &str, email: &str) -> Result<Self> {
        let uid = uid.trim();
        if uid.is_empty() {
            return Err(DomainError::Validation("uid must not be empty".into()));
        }
        Ok(Self {
            handle: Handle::new(handle)?,
            uid: uid.to_string(),
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            email: Self::email(email)?,
        })
    }

    /// Minimal shape check; deliverability is the identity provider's concern.
    pub fn email(raw: &str) -> Result<String> {
        let email = raw.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(email.to_string()),
            _ => Err(DomainError::Validation(format!("`{email}` is not an email address"))),
        }
    }
}

/// The authenticated caller on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub handle: Handle,
    pub is_admin: bool,
    pub is_blocked: bool,
}

impl Actor {
    pub fn member(handle: Handle) -> Self {
        Self { handle, is_admin: false, is_blocked: false }
    }

    pub fn admin(handle: Handle) -> Self {
        Self { handle, is_admin: true, is_blocked: false }
    }

    /// True when the actor owns the resource or is an admin.
    pub fn owns_or_moderates(&self, owner: &Handle) -> bool {
        self.is_admin || &self.handle == owner
    }
}

impl From<&User> for Actor {
    fn from(user: &User) -> Self {
        Self {
            handle: user.handle.clone(),
            is_admin: user.is_admin,
            is_blocked: user.is_blocked,
        }
    }
}

/// Thread listing order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreadSort {
    /// Store key order, which is creation order.
    #[default]
    Insertion,
    /// Newest first.
    Date,
    /// Case-insensitive title order.
    Title,
}

impl FromStr for ThreadSort {
    type Err = Infallible;

    /// Unknown values fall back to insertion order.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim() {
            "date" => Self::Date,
            "title" => Self::Title,
            _ => Self::Insertion,
        })
    }
}

/// Search, author filter and sort for `list_threads`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadQuery {
    pub search: Option<String>,
    pub sort: ThreadSort,
    pub author: Option<String>,
}

impl ThreadQuery {
    /// Builds a query from raw form values; blank strings mean "not set".
    pub fn new(search: &str, sort: &str, author: &str) -> Self {
        let non_blank = |s: &str| Some(s.trim()).filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            search: non_blank(search),
            sort: sort.parse().unwrap_or_default(),
            author: non_blank(author),
        }
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn author(mut self, handle: impl Into<String>) -> Self {
        self.author = Some(handle.into());
        self
    }

    pub fn sorted_by(mut self, sort: ThreadSort) -> Self {
        self.sort = sort;
        self
    }
}

/// Comment listing order by `createdOn`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentOrder {
    Oldest,
    #[default]
    Newest,
}

impl FromStr for CommentOrder {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.trim() {
            "oldest" => Self::Oldest,
            _ => Self::Newest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> ValidationRules {
        ValidationRules::default()
    }

    #[test]
    fn short_title_is_rejected() {
        let err = NewThread::new("alice", "Hi", "ab", "NYC", &rules()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(ref m) if m.contains("title")));
    }

    #[test]
    fn new_thread_trims_fields() {
        let thread = NewThread::new(" alice ", "  Everest Trip ", "Amazing climb", "Nepal", &rules()).unwrap();
        assert_eq!(thread.author.as_str(), "alice");
        assert_eq!(thread.title, "Everest Trip");
    }

    #[test]
    fn handle_rejects_path_characters() {
        assert!(Handle::new("").is_err());
        assert!(Handle::new("   ").is_err());
        assert!(Handle::new("a/b").is_err());
        assert!(Handle::new("a.b").is_err());
        assert!(Handle::new("trail_blazer-42").is_ok());
    }

    #[test]
    fn handle_deserialization_validates() {
        let ok: Handle = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(ok.as_str(), "bob");
        assert!(serde_json::from_str::<Handle>("\"a/b\"").is_err());
    }

    #[test]
    fn blank_tag_text_parses_to_none() {
        assert_eq!(TagName::parse("   ", &rules()).unwrap(), None);
        let name = TagName::parse("  Everest ", &rules()).unwrap().unwrap();
        assert_eq!(name.as_str(), "Everest");
        assert!(TagName::parse(&"x".repeat(33), &rules()).is_err());
    }

    #[test]
    fn query_treats_blank_values_as_unset() {
        let query = ThreadQuery::new("  ", "date", "");
        assert_eq!(query, ThreadQuery::default().sorted_by(ThreadSort::Date));
        assert_eq!("bogus".parse::<ThreadSort>().unwrap(), ThreadSort::Insertion);
    }

    #[test]
    fn actor_ownership() {
        let alice = Handle::new("alice").unwrap();
        let bob = Handle::new("bob").unwrap();
        assert!(Actor::member(alice.clone()).owns_or_moderates(&alice));
        assert!(!Actor::member(bob.clone()).owns_or_moderates(&alice));
        assert!(Actor::admin(bob).owns_or_moderates(&alice));
    }

    #[test]
    fn email_needs_local_part_and_domain() {
        assert!(NewUser::email("a@b").is_ok());
        assert!(NewUser::email("@b").is_err());
        assert!(NewUser::email("ab").is_err());
    }
}
