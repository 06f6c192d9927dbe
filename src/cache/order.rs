//! Remembered channel ordering.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::chat::types::OrderedChannel;

/// Last observed UI rank of each channel, keyed by channel id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelOrder {
  ranks: HashMap<String, usize>,
}

impl ChannelOrder {
  /// Rank channels by their position. Channels without an id cannot be ordered and are skipped.
  pub fn from_channels<C: OrderedChannel>(channels: &[C]) -> Self {
    let ranks = channels
      .iter()
      .enumerate()
      .filter_map(|(index, channel)| channel.channel_id().map(|id| (id.to_string(), index)))
      .collect();
    Self { ranks }
  }

  pub fn rank(&self, channel_id: &str) -> Option<usize> {
    self.ranks.get(channel_id).copied()
  }

  pub fn len(&self) -> usize {
    self.ranks.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ranks.is_empty()
  }

  /// Stable sort by remembered rank.
  ///
  /// Channels with no id, or an id this order has never seen, go after all
  /// ranked channels and keep their relative input order.
  pub fn apply<C: OrderedChannel>(&self, mut channels: Vec<C>) -> Vec<C> {
    channels.sort_by_key(|channel| match channel.channel_id().and_then(|id| self.rank(id)) {
      Some(rank) => (false, rank),
      None => (true, 0),
    });
    channels
  }
}
