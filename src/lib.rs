//! Offline cache for chat client state.
//!
//! [`OfflineCache`] sits between a chat client and a key-value store. It
//! persists client and channel snapshots when the app backgrounds and
//! restores them on the next start, so cached conversations render before
//! the network is available.

pub mod cache;
pub mod chat;
pub mod config;
pub mod error;
pub mod event;
pub mod logging;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{create_offline_cache, OfflineCache, OfflineCacheBuilder};
pub use error::{CacheError, Result};
