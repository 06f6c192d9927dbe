//! Read-only summary of what a store currently holds.

use serde_json::Value;
use std::fmt;

use super::keys::CacheKey;
use super::order::ChannelOrder;
use super::store::CacheStore;
use super::truncate::TruncationLimits;
use super::version::VersionStamp;
use crate::chat::types::{ChannelSnapshot, ClientSnapshot};
use crate::error::{CacheError, Result};

/// Counts for one cached channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
  pub id: String,
  pub messages: usize,
  pub pinned: usize,
  pub threads: usize,
  pub replies: usize,
}

/// Summary of the cached keys, decoded loosely so any message shape can be inspected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheReport {
  pub sdk_version: Option<String>,
  pub client_library_version: Option<String>,
  pub user_id: Option<String>,
  pub anonymous: bool,
  pub channels: Vec<ChannelSummary>,
  pub ordered_channels: Option<usize>,
  /// Keys that are present but could not be decoded
  pub unreadable: Vec<CacheKey>,
}

impl CacheReport {
  pub async fn load<S: CacheStore + ?Sized>(store: &S) -> Result<Self> {
    let mut report = CacheReport {
      sdk_version: read(store, CacheKey::SdkVersion).await?,
      client_library_version: read(store, CacheKey::ClientLibraryVersion).await?,
      ..Default::default()
    };

    if let Some(raw) = read(store, CacheKey::ClientData).await? {
      match serde_json::from_str::<ClientSnapshot<Value>>(&raw) {
        Ok(client) => {
          report.user_id = client.user.get("id").and_then(Value::as_str).map(String::from);
          report.anonymous = client.anonymous;
        }
        Err(_) => report.unreadable.push(CacheKey::ClientData),
      }
    }

    if let Some(raw) = read(store, CacheKey::ChannelsData).await? {
      match serde_json::from_str::<Vec<ChannelSnapshot<Value>>>(&raw) {
        Ok(channels) => {
          report.channels = channels
            .iter()
            .map(|channel| ChannelSummary {
              id: channel.id.clone(),
              messages: channel.messages.len(),
              pinned: channel.pinned_messages.len(),
              threads: channel.threads.len(),
              replies: channel.reply_count(),
            })
            .collect();
        }
        Err(_) => report.unreadable.push(CacheKey::ChannelsData),
      }
    }

    if let Some(raw) = read(store, CacheKey::ChannelsOrder).await? {
      match serde_json::from_str::<ChannelOrder>(&raw) {
        Ok(order) => report.ordered_channels = Some(order.len()),
        Err(_) => report.unreadable.push(CacheKey::ChannelsOrder),
      }
    }

    Ok(report)
  }

  pub fn is_empty(&self) -> bool {
    self.sdk_version.is_none()
      && self.client_library_version.is_none()
      && self.user_id.is_none()
      && self.channels.is_empty()
      && self.ordered_channels.is_none()
      && self.unreadable.is_empty()
  }

  /// Whether a restore with `versions` would accept this cache.
  pub fn is_compatible(&self, versions: &VersionStamp) -> bool {
    versions.matches(
      self.sdk_version.as_deref(),
      self.client_library_version.as_deref(),
    )
  }

  pub fn total_messages(&self) -> usize {
    self.channels.iter().map(|c| c.messages).sum()
  }

  /// Channel messages a restore under `limits` would drop.
  pub fn cropped_messages(&self, limits: &TruncationLimits) -> usize {
    self
      .channels
      .iter()
      .map(|c| c.messages.saturating_sub(limits.max_messages_per_channel))
      .sum()
  }
}

impl fmt::Display for CacheReport {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.is_empty() {
      return writeln!(f, "cache is empty");
    }

    let or_missing = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    writeln!(f, "sdk version:            {}", or_missing(&self.sdk_version))?;
    writeln!(
      f,
      "client library version: {}",
      or_missing(&self.client_library_version)
    )?;
    writeln!(
      f,
      "user:                   {}{}",
      or_missing(&self.user_id),
      if self.anonymous { " (anonymous)" } else { "" }
    )?;
    match self.ordered_channels {
      Some(n) => writeln!(f, "channel order:          {} channels", n)?,
      None => writeln!(f, "channel order:          -")?,
    }
    writeln!(
      f,
      "channels:               {} ({} messages)",
      self.channels.len(),
      self.total_messages()
    )?;
    for channel in &self.channels {
      writeln!(
        f,
        "  {:<24} {:>6} messages {:>4} pinned {:>4} threads {:>6} replies",
        channel.id, channel.messages, channel.pinned, channel.threads, channel.replies
      )?;
    }
    for key in &self.unreadable {
      writeln!(f, "unreadable: {}", key)?;
    }
    Ok(())
  }
}

async fn read<S: CacheStore + ?Sized>(store: &S, key: CacheKey) -> Result<Option<String>> {
  store.get(key).await.map_err(CacheError::store(key))
}
