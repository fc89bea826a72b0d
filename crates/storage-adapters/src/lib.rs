//! # storage-adapters
//!
//! `ContentStore` implementations.
//! - `InMemoryContentStore`: JSON tree with broadcast-driven subscriptions.
//! - `PollingContentStore`: wraps any store and provides subscriptions by polling.

mod listeners;
mod memory;
mod polling;
mod tree;

pub use memory::{InMemoryContentStore, DEFAULT_CHANNEL_CAPACITY};
pub use polling::PollingContentStore;
