//! Test doubles shared by the cache tests.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::cache::keys::CacheKey;
use crate::cache::store::{CacheStore, MemoryStore, StoreError, SyncCacheStore};
use crate::chat::client::{ChatClient, ClientError, TokenOrProvider};
use crate::chat::types::{
  ChannelSnapshot, ClientSnapshot, Message, StateSnapshot, User, UserIdentity,
};

pub const CLIENT_LIBRARY_VERSION: &str = "1.0.0";

pub fn message(id: &str) -> Message {
  Message {
    id: id.to_string(),
    text: format!("message {}", id),
    user_id: Some("u1".to_string()),
    parent_id: None,
    created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
  }
}

/// State for `user_id` with channels `c0..` holding messages `c{n}-m{i}`.
pub fn sample_state(user_id: &str, channels: usize, messages: usize) -> StateSnapshot<User, Message> {
  let channels = (0..channels)
    .map(|n| {
      let id = format!("c{}", n);
      let messages = (0..messages)
        .map(|i| message(&format!("{}-m{}", id, i)))
        .collect();
      ChannelSnapshot::new(id, messages)
    })
    .collect();

  StateSnapshot {
    client: ClientSnapshot {
      user: User {
        id: user_id.to_string(),
        name: Some(user_id.to_uppercase()),
        image: None,
      },
      connection_id: Some("conn-1".to_string()),
      anonymous: false,
    },
    channels,
  }
}

type Restored = (ClientSnapshot<User>, Vec<ChannelSnapshot<Message>>);

/// Chat client that records every call.
pub struct MockClient {
  state: StateSnapshot<User, Message>,
  calls: Mutex<Vec<String>>,
  restored: Mutex<Vec<Restored>>,
  fail_connect: AtomicBool,
  fail_restore: AtomicBool,
  hold_restore: AtomicBool,
  restore_gate: Notify,
}

impl MockClient {
  pub fn new() -> Self {
    Self::with_state(sample_state("nobody", 0, 0))
  }

  pub fn with_state(state: StateSnapshot<User, Message>) -> Self {
    Self {
      state,
      calls: Mutex::new(Vec::new()),
      restored: Mutex::new(Vec::new()),
      fail_connect: AtomicBool::new(false),
      fail_restore: AtomicBool::new(false),
      hold_restore: AtomicBool::new(false),
      restore_gate: Notify::new(),
    }
  }

  /// Make `connect_user` and `open_connection` fail.
  pub fn fail_connect(&self) {
    self.fail_connect.store(true, Ordering::SeqCst);
  }

  pub fn fail_restore(&self) {
    self.fail_restore.store(true, Ordering::SeqCst);
  }

  /// Make `restore_state` wait until `release_restore` is called.
  pub fn hold_restore(&self) {
    self.hold_restore.store(true, Ordering::SeqCst);
  }

  pub fn release_restore(&self) {
    self.hold_restore.store(false, Ordering::SeqCst);
    self.restore_gate.notify_one();
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn restored(&self) -> Vec<Restored> {
    self.restored.lock().unwrap().clone()
  }

  fn record(&self, call: String) {
    self.calls.lock().unwrap().push(call);
  }
}

#[async_trait]
impl ChatClient for MockClient {
  type User = User;
  type Message = Message;
  type Connected = String;

  fn library_version(&self) -> String {
    CLIENT_LIBRARY_VERSION.to_string()
  }

  fn state_snapshot(&self) -> StateSnapshot<User, Message> {
    self.state.clone()
  }

  async fn restore_state(
    &self,
    client: ClientSnapshot<User>,
    channels: Vec<ChannelSnapshot<Message>>,
  ) -> Result<(), ClientError> {
    if self.hold_restore.load(Ordering::SeqCst) {
      self.restore_gate.notified().await;
    }
    if self.fail_restore.load(Ordering::SeqCst) {
      return Err(ClientError::Restore("restore rejected".to_string()));
    }
    self.restored.lock().unwrap().push((client, channels));
    Ok(())
  }

  async fn open_connection(&self) -> Result<(), ClientError> {
    self.record("open_connection".to_string());
    if self.fail_connect.load(Ordering::SeqCst) {
      return Err(ClientError::Connect("socket closed".to_string()));
    }
    Ok(())
  }

  async fn connect_user(
    &self,
    user: UserIdentity,
    token: &TokenOrProvider,
  ) -> Result<String, ClientError> {
    let token = token.resolve().await?;
    self.record(format!("connect_user:{}:{}", user.id, token));
    if self.fail_connect.load(Ordering::SeqCst) {
      return Err(ClientError::Connect("network unreachable".to_string()));
    }
    Ok(format!("connection-{}", user.id))
  }

  fn set_user_id(&self, user_id: &str) {
    self.record(format!("set_user_id:{}", user_id));
  }

  fn set_anonymous(&self, anonymous: bool) {
    self.record(format!("set_anonymous:{}", anonymous));
  }

  async fn set_token(
    &self,
    user: &UserIdentity,
    token: &TokenOrProvider,
  ) -> Result<(), ClientError> {
    let token = token.resolve().await?;
    self.record(format!("set_token:{}:{}", user.id, token));
    Ok(())
  }

  fn set_user(&self, user: &UserIdentity) {
    self.record(format!("set_user:{}", user.id));
  }
}

/// Store that fails every operation on one key (or on all keys).
pub struct FailingStore {
  fail_on: Option<CacheKey>,
  inner: MemoryStore,
}

impl FailingStore {
  pub fn on(key: CacheKey) -> Self {
    Self {
      fail_on: Some(key),
      inner: MemoryStore::new(),
    }
  }

  pub fn all() -> Self {
    Self {
      fail_on: None,
      inner: MemoryStore::new(),
    }
  }

  /// Whatever was written before failures.
  pub fn inner(&self) -> &MemoryStore {
    &self.inner
  }

  fn check(&self, key: CacheKey) -> Result<(), StoreError> {
    match self.fail_on {
      Some(failing) if failing != key => Ok(()),
      _ => Err(StoreError::Backend(format!("disk full writing {}", key))),
    }
  }
}

#[async_trait]
impl CacheStore for FailingStore {
  async fn get(&self, key: CacheKey) -> Result<Option<String>, StoreError> {
    self.check(key)?;
    SyncCacheStore::get(&self.inner, key)
  }

  async fn set(&self, key: CacheKey, value: String) -> Result<(), StoreError> {
    self.check(key)?;
    SyncCacheStore::set(&self.inner, key, &value)
  }

  async fn remove(&self, key: CacheKey) -> Result<(), StoreError> {
    self.check(key)?;
    SyncCacheStore::remove(&self.inner, key)
  }
}

/// Store that logs every write and removal, in order.
#[derive(Clone, Default)]
pub struct RecordingStore {
  inner: Arc<MemoryStore>,
  log: Arc<Mutex<Vec<String>>>,
}

impl RecordingStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Operations as `set:<key>` or `remove:<key>`.
  pub fn log(&self) -> Vec<String> {
    self.log.lock().unwrap().clone()
  }

  fn record(&self, op: &str, key: CacheKey) {
    self.log.lock().unwrap().push(format!("{}:{}", op, key));
  }
}

#[async_trait]
impl CacheStore for RecordingStore {
  async fn get(&self, key: CacheKey) -> Result<Option<String>, StoreError> {
    SyncCacheStore::get(&*self.inner, key)
  }

  async fn set(&self, key: CacheKey, value: String) -> Result<(), StoreError> {
    self.record("set", key);
    SyncCacheStore::set(&*self.inner, key, &value)
  }

  async fn remove(&self, key: CacheKey) -> Result<(), StoreError> {
    self.record("remove", key);
    SyncCacheStore::remove(&*self.inner, key)
  }
}
