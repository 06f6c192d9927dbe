//! Persisted key names.

use std::fmt;

/// One of the five keys the cache owns in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
  /// Serialized `ClientSnapshot`
  ClientData,
  /// Serialized collection of `ChannelSnapshot`
  ChannelsData,
  /// Serialized `ChannelOrder`, absent when no order is known
  ChannelsOrder,
  /// Crate version at last persist
  SdkVersion,
  /// Chat client library version at last persist
  ClientLibraryVersion,
}

impl CacheKey {
  pub const ALL: [CacheKey; 5] = [
    CacheKey::SdkVersion,
    CacheKey::ClientLibraryVersion,
    CacheKey::ClientData,
    CacheKey::ChannelsData,
    CacheKey::ChannelsOrder,
  ];

  /// Name under which the value is stored.
  pub fn as_str(self) -> &'static str {
    match self {
      CacheKey::ClientData => "client-data",
      CacheKey::ChannelsData => "channels-data",
      CacheKey::ChannelsOrder => "channels-order",
      CacheKey::SdkVersion => "sdk-version",
      CacheKey::ClientLibraryVersion => "client-library-version",
    }
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
