//! Offline persistence and rehydration of chat client state.
//!
//! This module provides a caching mechanism that:
//! - Persists client and channel snapshots when the app backgrounds
//! - Restores them on startup, dropping older messages to bound memory
//! - Discards snapshots written by other sdk or client library versions
//! - Installs the cached session offline when there is no network
//! - Remembers the last channel ordering shown to the user

pub mod inspect;
pub mod keys;
pub mod offline;
pub mod order;
pub mod sqlite;
pub mod store;
pub mod truncate;
pub mod version;
mod watchers;

pub use inspect::CacheReport;
pub use keys::CacheKey;
pub use offline::{
  clear_store, create_offline_cache, CacheEvent, Initialization, OfflineCache, OfflineCacheBuilder,
  Rehydration,
};
pub use order::ChannelOrder;
pub use sqlite::SqliteStore;
pub use store::{Blocking, CacheStore, MemoryStore, NoopStore, StoreError, SyncCacheStore};
pub use truncate::TruncationLimits;
pub use version::VersionStamp;
