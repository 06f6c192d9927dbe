//! Key-value store contracts and in-process implementations.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::keys::CacheKey;

/// Errors raised by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),
  #[error("store lock poisoned")]
  LockPoisoned,
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("{0}")]
  Backend(String),
}

/// Asynchronous key-value store the cache persists into.
///
/// Values are serialized JSON (or plain version strings).
#[async_trait]
pub trait CacheStore: Send + Sync {
  async fn get(&self, key: CacheKey) -> Result<Option<String>, StoreError>;

  async fn set(&self, key: CacheKey, value: String) -> Result<(), StoreError>;

  async fn remove(&self, key: CacheKey) -> Result<(), StoreError>;
}

/// Synchronous variant of [`CacheStore`], for backends that only offer
/// blocking local storage. Wrap in [`Blocking`] to hand to the cache.
pub trait SyncCacheStore: Send + Sync {
  fn get(&self, key: CacheKey) -> Result<Option<String>, StoreError>;

  fn set(&self, key: CacheKey, value: &str) -> Result<(), StoreError>;

  fn remove(&self, key: CacheKey) -> Result<(), StoreError>;
}

/// Adapts a [`SyncCacheStore`] into a [`CacheStore`].
///
/// Operations run inline on the calling task; backends are expected to be fast local storage.
pub struct Blocking<S> {
  inner: S,
}

impl<S: SyncCacheStore> Blocking<S> {
  pub fn new(inner: S) -> Self {
    Self { inner }
  }

  pub fn inner(&self) -> &S {
    &self.inner
  }
}

#[async_trait]
impl<S: SyncCacheStore> CacheStore for Blocking<S> {
  async fn get(&self, key: CacheKey) -> Result<Option<String>, StoreError> {
    self.inner.get(key)
  }

  async fn set(&self, key: CacheKey, value: String) -> Result<(), StoreError> {
    self.inner.set(key, &value)
  }

  async fn remove(&self, key: CacheKey) -> Result<(), StoreError> {
    self.inner.remove(key)
  }
}

#[async_trait]
impl<S: CacheStore + ?Sized> CacheStore for Arc<S> {
  async fn get(&self, key: CacheKey) -> Result<Option<String>, StoreError> {
    (**self).get(key).await
  }

  async fn set(&self, key: CacheKey, value: String) -> Result<(), StoreError> {
    (**self).set(key, value).await
  }

  async fn remove(&self, key: CacheKey) -> Result<(), StoreError> {
    (**self).remove(key).await
  }
}

/// Store implementation that doesn't keep anything.
/// Used when caching is disabled - every read misses.
pub struct NoopStore;

impl SyncCacheStore for NoopStore {
  fn get(&self, _key: CacheKey) -> Result<Option<String>, StoreError> {
    Ok(None)
  }

  fn set(&self, _key: CacheKey, _value: &str) -> Result<(), StoreError> {
    Ok(())
  }

  fn remove(&self, _key: CacheKey) -> Result<(), StoreError> {
    Ok(())
  }
}

/// Process-local store backed by a map.
#[derive(Default)]
pub struct MemoryStore {
  values: Mutex<HashMap<CacheKey, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn contains(&self, key: CacheKey) -> bool {
    self
      .values
      .lock()
      .map(|values| values.contains_key(&key))
      .unwrap_or(false)
  }

  pub fn len(&self) -> usize {
    self.values.lock().map(|values| values.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl SyncCacheStore for MemoryStore {
  fn get(&self, key: CacheKey) -> Result<Option<String>, StoreError> {
    let values = self.values.lock().map_err(|_| StoreError::LockPoisoned)?;
    Ok(values.get(&key).cloned())
  }

  fn set(&self, key: CacheKey, value: &str) -> Result<(), StoreError> {
    let mut values = self.values.lock().map_err(|_| StoreError::LockPoisoned)?;
    values.insert(key, value.to_string());
    Ok(())
  }

  fn remove(&self, key: CacheKey) -> Result<(), StoreError> {
    let mut values = self.values.lock().map_err(|_| StoreError::LockPoisoned)?;
    values.remove(&key);
    Ok(())
  }
}
