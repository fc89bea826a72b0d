//! # Forum Policy
//!
//! Tunable limits the domain constructors enforce. Deserializable so the
//! `configs` crate can layer them from files and environment.

use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, Result};

/// Default cap on active tag associations per thread.
pub const MAX_TAGS_COUNT: usize = 10;

/// Inclusive character-count bounds for a text field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldBounds {
    pub min: usize,
    pub max: usize,
}

impl FieldBounds {
    pub const fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    /// Checks `value` (already trimmed by the caller) against the bounds.
    pub fn check(&self, field: &str, value: &str) -> Result<()> {
        let len = value.chars().count();
        if len < self.min || len > self.max {
            return Err(DomainError::Validation(format!(
                "{field} must be between {} and {} characters (got {len})",
                self.min, self.max
            )));
        }
        Ok(())
    }
}

/// Per-field bounds for user-supplied text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
    pub title: FieldBounds,
    pub content: FieldBounds,
    pub location: FieldBounds,
    pub comment: FieldBounds,
    pub tag: FieldBounds,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            title: FieldBounds::new(3, 64),
            content: FieldBounds::new(3, 8192),
            location: FieldBounds::new(2, 64),
            comment: FieldBounds::new(1, 2048),
            tag: FieldBounds::new(1, 32),
        }
    }
}

impl ValidationRules {
    fn fields(&self) -> [(&'static str, FieldBounds); 5] {
        [
            ("title", self.title),
            ("content", self.content),
            ("location", self.location),
            ("comment", self.comment),
            ("tag", self.tag),
        ]
    }
}

/// How tag names are compared when deduplicating against the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagMatching {
    /// Trimmed names must be byte-for-byte equal.
    #[default]
    Exact,
    /// Trimmed names are compared after Unicode lowercasing.
    CaseInsensitive,
}

impl TagMatching {
    /// The key two names must share to resolve to the same tag.
    pub fn key(&self, name: &str) -> String {
        match self {
            Self::Exact => name.to_string(),
            Self::CaseInsensitive => name.to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagPolicy {
    pub max_per_thread: usize,
    pub matching: TagMatching,
    /// Use compare-and-set on the registry index and association set
    /// instead of the plain check-then-write sequence.
    pub strict: bool,
    pub max_cas_attempts: u32,
}

impl Default for TagPolicy {
    fn default() -> Self {
        Self {
            max_per_thread: MAX_TAGS_COUNT,
            matching: TagMatching::Exact,
            strict: false,
            max_cas_attempts: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingPolicy {
    /// When false, a search term suppresses the author filter and any
    /// filter suppresses sorting. When true, both filters apply and the
    /// result is always sorted.
    pub combine_filters: bool,
}

/// Everything the services need to know about limits and behavior switches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForumPolicy {
    pub validation: ValidationRules,
    pub tags: TagPolicy,
    pub listing: ListingPolicy,
}

impl ForumPolicy {
    /// Rejects policies no input could ever satisfy.
    pub fn validate(&self) -> Result<()> {
        for (name, bounds) in self.validation.fields() {
            if bounds.min > bounds.max {
                return Err(DomainError::Validation(format!(
                    "{name} bounds are inverted ({} > {})",
                    bounds.min, bounds.max
                )));
            }
        }
        if self.validation.tag.min == 0 {
            return Err(DomainError::Validation("tag minimum length must be at least 1".into()));
        }
        if self.tags.max_per_thread == 0 {
            return Err(DomainError::Validation("tags.max_per_thread must be positive".into()));
        }
        if self.tags.max_cas_attempts == 0 {
            return Err(DomainError::Validation("tags.max_cas_attempts must be positive".into()));
        }
        Ok(())
    }
}
