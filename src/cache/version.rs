//! Version gate for persisted snapshots.

/// Version of this crate, recorded with every persisted snapshot.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// The pair of versions a snapshot was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStamp {
  pub sdk: String,
  pub client_library: String,
}

impl VersionStamp {
  pub fn new(sdk: impl Into<String>, client_library: impl Into<String>) -> Self {
    Self {
      sdk: sdk.into(),
      client_library: client_library.into(),
    }
  }

  /// Stamp for this crate running against the given client library version.
  pub fn current(client_library: impl Into<String>) -> Self {
    Self::new(SDK_VERSION, client_library)
  }

  /// Whether the cached versions match exactly. A missing version never matches.
  pub fn matches(&self, cached_sdk: Option<&str>, cached_client_library: Option<&str>) -> bool {
    cached_sdk == Some(self.sdk.as_str())
      && cached_client_library == Some(self.client_library.as_str())
  }
}
