//! Snapshot types exchanged between the chat client and the cache.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

/// A message shape the cache can persist and truncate.
///
/// Only the id is needed: pinned messages and threads are matched against
/// the retained messages by id.
pub trait CachedMessage: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  fn message_id(&self) -> &str;
}

/// A user shape stored inside the client snapshot.
pub trait CachedUser: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  fn user_id(&self) -> &str;

  fn display_name(&self) -> Option<&str>;
}

/// Anything that can be ordered by the remembered channel order.
///
/// Channels that have not been created on the server yet have no id.
pub trait OrderedChannel {
  fn channel_id(&self) -> Option<&str>;
}

/// Minimal identity used to authenticate or install a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
  pub id: String,
  pub name: Option<String>,
}

impl UserIdentity {
  pub fn from_user<U: CachedUser>(user: &U) -> Self {
    Self {
      id: user.user_id().to_string(),
      name: user.display_name().map(String::from),
    }
  }
}

/// Serializable projection of the client's session state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientSnapshot<U> {
  pub user: U,
  /// Connection id of the last live socket, if any
  #[serde(default)]
  pub connection_id: Option<String>,
  #[serde(default)]
  pub anonymous: bool,
}

/// Serializable projection of one channel's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "M: Deserialize<'de>"))]
pub struct ChannelSnapshot<M> {
  pub id: String,
  #[serde(default)]
  pub channel_type: String,
  /// Channel metadata (name, members, custom fields), carried through untouched
  #[serde(default)]
  pub data: serde_json::Value,
  /// Chronological, oldest first
  pub messages: Vec<M>,
  #[serde(default)]
  pub pinned_messages: Vec<M>,
  /// Thread replies keyed by parent message id, oldest first
  #[serde(default)]
  pub threads: BTreeMap<String, Vec<M>>,
}

impl<M> ChannelSnapshot<M> {
  pub fn new(id: impl Into<String>, messages: Vec<M>) -> Self {
    Self {
      id: id.into(),
      channel_type: "messaging".to_string(),
      data: serde_json::Value::Null,
      messages,
      pinned_messages: Vec::new(),
      threads: BTreeMap::new(),
    }
  }

  /// Number of thread replies across all threads.
  pub fn reply_count(&self) -> usize {
    self.threads.values().map(Vec::len).sum()
  }
}

/// Full client + channels snapshot, as handed out and taken back by the client.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSnapshot<U, M> {
  pub client: ClientSnapshot<U>,
  pub channels: Vec<ChannelSnapshot<M>>,
}

/// Default user shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
  pub id: String,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub image: Option<String>,
}

impl CachedUser for User {
  fn user_id(&self) -> &str {
    &self.id
  }

  fn display_name(&self) -> Option<&str> {
    self.name.as_deref()
  }
}

/// Default message shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  pub id: String,
  #[serde(default)]
  pub text: String,
  #[serde(default)]
  pub user_id: Option<String>,
  #[serde(default)]
  pub parent_id: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl CachedMessage for Message {
  fn message_id(&self) -> &str {
    &self.id
  }
}

/// Default channel handle used for ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
  pub id: Option<String>,
  pub name: String,
}

impl OrderedChannel for Channel {
  fn channel_id(&self) -> Option<&str> {
    self.id.as_deref()
  }
}

impl<M> OrderedChannel for ChannelSnapshot<M> {
  fn channel_id(&self) -> Option<&str> {
    Some(&self.id)
  }
}
