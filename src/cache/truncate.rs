//! Bounds the memory of restored channels.
//!
//! A message is roughly 2KB once hydrated. 800 messages per channel is about
//! 1.6MB, and 300 replies per thread about 600KB per thread.

use serde::Deserialize;
use std::collections::HashSet;

use crate::chat::types::{CachedMessage, ChannelSnapshot};

pub const MAX_MESSAGES_PER_CHANNEL: usize = 800;
pub const MAX_MESSAGES_PER_THREAD: usize = 300;

/// Truncation caps applied at rehydration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TruncationLimits {
  pub max_messages_per_channel: usize,
  pub max_messages_per_thread: usize,
}

impl Default for TruncationLimits {
  fn default() -> Self {
    Self {
      max_messages_per_channel: MAX_MESSAGES_PER_CHANNEL,
      max_messages_per_thread: MAX_MESSAGES_PER_THREAD,
    }
  }
}

impl TruncationLimits {
  pub fn new(max_messages_per_channel: usize, max_messages_per_thread: usize) -> Self {
    Self {
      max_messages_per_channel,
      max_messages_per_thread,
    }
  }

  /// Drop older messages from every channel.
  pub fn crop_older_messages<M: CachedMessage>(
    &self,
    channels: Vec<ChannelSnapshot<M>>,
  ) -> Vec<ChannelSnapshot<M>> {
    channels
      .into_iter()
      .map(|channel| self.crop_channel(channel))
      .collect()
  }

  /// Keep the newest messages of one channel, then drop pinned messages and
  /// threads that point at messages no longer retained.
  pub fn crop_channel<M: CachedMessage>(&self, mut channel: ChannelSnapshot<M>) -> ChannelSnapshot<M> {
    let excess = channel
      .messages
      .len()
      .saturating_sub(self.max_messages_per_channel);
    channel.messages.drain(..excess);

    let retained: HashSet<String> = channel
      .messages
      .iter()
      .map(|m| m.message_id().to_string())
      .collect();

    channel
      .pinned_messages
      .retain(|m| retained.contains(m.message_id()));

    channel
      .threads
      .retain(|parent_id, _| retained.contains(parent_id));
    for replies in channel.threads.values_mut() {
      let excess = replies.len().saturating_sub(self.max_messages_per_thread);
      replies.drain(..excess);
    }

    channel
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::chat::types::Message;
  use chrono::{TimeZone, Utc};

  fn message(id: &str) -> Message {
    Message {
      id: id.to_string(),
      text: format!("text {}", id),
      user_id: None,
      parent_id: None,
      created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
    }
  }

  fn messages(prefix: &str, count: usize) -> Vec<Message> {
    (0..count).map(|i| message(&format!("{}{}", prefix, i))).collect()
  }

  #[test]
  fn test_keeps_most_recent_messages() {
    let channel = ChannelSnapshot::new("general", messages("m", 1000));
    let cropped = TruncationLimits::default().crop_channel(channel);

    assert_eq!(cropped.messages.len(), 800);
    assert_eq!(cropped.messages.first().unwrap().id, "m200");
    assert_eq!(cropped.messages.last().unwrap().id, "m999");
  }

  #[test]
  fn test_short_channel_untouched() {
    let channel = ChannelSnapshot::new("general", messages("m", 5));
    let cropped = TruncationLimits::new(10, 3).crop_channel(channel.clone());
    assert_eq!(cropped, channel);
  }

  #[test]
  fn test_pinned_messages_follow_retained_set() {
    let mut channel = ChannelSnapshot::new("general", messages("m", 10));
    channel.pinned_messages = vec![message("m1"), message("m8"), message("gone")];

    let cropped = TruncationLimits::new(5, 3).crop_channel(channel);

    let pinned: Vec<&str> = cropped.pinned_messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(pinned, vec!["m8"]);
  }

  #[test]
  fn test_threads_follow_retained_set_and_are_capped() {
    let mut channel = ChannelSnapshot::new("general", messages("m", 10));
    channel.threads.insert("m0".to_string(), messages("r", 2));
    channel.threads.insert("m9".to_string(), messages("r", 7));

    let cropped = TruncationLimits::new(5, 3).crop_channel(channel);

    assert!(!cropped.threads.contains_key("m0"));
    let replies = &cropped.threads["m9"];
    let ids: Vec<&str> = replies.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["r4", "r5", "r6"]);
  }

  #[test]
  fn test_caps_hold_for_every_channel() {
    let limits = TruncationLimits::new(7, 2);
    let channels: Vec<ChannelSnapshot<Message>> = (0..20)
      .map(|n| {
        let mut channel = ChannelSnapshot::new(format!("c{}", n), messages("m", n * 3));
        for parent in channel.messages.clone() {
          channel.threads.insert(parent.id.clone(), messages("r", n));
        }
        channel.pinned_messages = channel.messages.iter().step_by(2).cloned().collect();
        channel
      })
      .collect();

    for channel in limits.crop_older_messages(channels) {
      assert!(channel.messages.len() <= 7);
      assert!(channel.threads.values().all(|replies| replies.len() <= 2));

      let ids: HashSet<&str> = channel.messages.iter().map(|m| m.id.as_str()).collect();
      assert!(channel
        .pinned_messages
        .iter()
        .all(|m| ids.contains(m.id.as_str())));
      assert!(channel.threads.keys().all(|k| ids.contains(k.as_str())));
    }
  }

  #[test]
  fn test_limits_from_partial_yaml() {
    let limits: TruncationLimits = serde_yaml::from_str("max_messages_per_thread: 50").unwrap();
    assert_eq!(limits.max_messages_per_channel, MAX_MESSAGES_PER_CHANNEL);
    assert_eq!(limits.max_messages_per_thread, 50);
  }
}
