//! # User Directory
//!
//! Maps handles to profiles and exposes the `Actor` the facade authorizes
//! against. The handle is the record key and never changes; uid and email
//! are unique across the directory.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use domains::{paths, Actor, ContentStore, DomainError, Handle, NewUser, Result, ThreadId, User, WriteBatch};
use serde_json::Value;
use tracing::{info, warn};

use crate::records::{child_count, decode, encode, marker_keys, UserRecord};

#[derive(Clone)]
pub struct UserDirectory {
    store: Arc<dyn ContentStore>,
}

impl UserDirectory {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Creates the profile. The handle slot is claimed with compare-and-set,
    /// so two registrations racing for one handle cannot both succeed.
    pub async fn register(&self, user: NewUser) -> Result<User> {
        let existing = self.list_all().await?;
        if existing.iter().any(|u| u.handle == user.handle) {
            return Err(DomainError::Duplicate(format!("handle `{}` is taken", user.handle)));
        }
        if existing.iter().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(DomainError::Duplicate(format!("email `{}` is already registered", user.email)));
        }
        if existing.iter().any(|u| u.uid == user.uid) {
            return Err(DomainError::Duplicate(format!("uid `{}` already has a handle", user.uid)));
        }

        let path = paths::user(&user.handle);
        let record = UserRecord::new(&user, Utc::now());
        if !self
            .store
            .compare_and_set(&path, None, Some(encode(&path, &record)?))
            .await?
        {
            return Err(DomainError::Duplicate(format!("handle `{}` is taken", user.handle)));
        }

        info!(handle = %user.handle, "user registered");
        Ok(record.into_user())
    }

    pub async fn get_by_handle(&self, handle: &Handle) -> Result<User> {
        let path = paths::user(handle);
        let value = self
            .store
            .get(&path)
            .await?
            .filter(|v| v.get("uid").is_some())
            .ok_or_else(|| DomainError::not_found("User", handle))?;
        Ok(decode::<UserRecord>(&path, value)?.into_user())
    }

    pub async fn get_by_uid(&self, uid: &str) -> Result<Option<User>> {
        Ok(self.list_all().await?.into_iter().find(|u| u.uid == uid))
    }

    /// Email comparison ignores ASCII case.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.trim();
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email)))
    }

    /// Every decodable profile in handle order.
    pub async fn list_all(&self) -> Result<Vec<User>> {
        let collection = paths::users();
        let Some(Value::Object(entries)) = self.store.get(&collection).await? else {
            return Ok(Vec::new());
        };
        let mut users = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match decode::<UserRecord>(&collection.child(&key), value) {
                Ok(record) => users.push(record.into_user()),
                Err(err) => warn!(handle = %key, error = %err, "skipping undecodable user record"),
            }
        }
        Ok(users)
    }

    /// Replaces the editable account fields in one write.
    pub async fn update_profile(&self, handle: &Handle, email: &str, first_name: &str, last_name: &str) -> Result<()> {
        let email = NewUser::email(email)?;
        self.get_by_handle(handle).await?;
        if let Some(other) = self.get_by_email(&email).await? {
            if &other.handle != handle {
                return Err(DomainError::Duplicate(format!("email `{email}` is already registered")));
            }
        }

        let batch = WriteBatch::new()
            .set(paths::user_field(handle, "email"), email)
            .set(paths::user_field(handle, "firstName"), first_name.trim())
            .set(paths::user_field(handle, "lastName"), last_name.trim());
        self.store.update(batch).await?;
        info!(handle = %handle, "profile updated");
        Ok(())
    }

    pub async fn set_blocked(&self, handle: &Handle, blocked: bool) -> Result<()> {
        self.set_flag(handle, "isBlocked", blocked).await
    }

    pub async fn set_admin(&self, handle: &Handle, admin: bool) -> Result<()> {
        self.set_flag(handle, "isAdmin", admin).await
    }

    async fn set_flag(&self, handle: &Handle, field: &str, value: bool) -> Result<()> {
        self.get_by_handle(handle).await?;
        self.store
            .set(&paths::user_field(handle, field), Value::Bool(value))
            .await?;
        info!(handle = %handle, field, value, "user flag changed");
        Ok(())
    }

    /// Resolves an identity-provider uid to the caller identity.
    pub async fn actor_for_uid(&self, uid: &str) -> Result<Actor> {
        self.get_by_uid(uid)
            .await?
            .map(|user| Actor::from(&user))
            .ok_or_else(|| DomainError::not_found("User", uid))
    }

    pub async fn liked_threads(&self, handle: &Handle) -> Result<BTreeSet<ThreadId>> {
        let markers = self.store.get(&paths::user_field(handle, "likedThreads")).await?;
        Ok(marker_keys(markers).into_iter().map(ThreadId::new).collect())
    }

    pub async fn count(&self) -> Result<usize> {
        Ok(child_count(self.store.get(&paths::users()).await?.as_ref()))
    }
}
