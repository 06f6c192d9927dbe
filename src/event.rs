use futures::stream::{BoxStream, StreamExt};
use std::str::FromStr;
use tokio::sync::broadcast;

/// Buffered events per subscriber before slow subscribers start lagging.
const DEFAULT_CAPACITY: usize = 64;

/// Application lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
  Active,
  Inactive,
  Background,
}

impl AppState {
  /// Whether entering this state should persist the cache
  pub fn is_backgrounding(self) -> bool {
    matches!(self, AppState::Inactive | AppState::Background)
  }
}

impl FromStr for AppState {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "active" => Ok(AppState::Active),
      "inactive" => Ok(AppState::Inactive),
      "background" => Ok(AppState::Background),
      other => Err(format!("unknown app state: {}", other)),
    }
  }
}

/// A connectivity reading. Either flag is `None` until the platform knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NetworkState {
  pub is_connected: Option<bool>,
  pub is_internet_reachable: Option<bool>,
}

impl NetworkState {
  pub fn new(is_connected: bool, is_internet_reachable: bool) -> Self {
    Self {
      is_connected: Some(is_connected),
      is_internet_reachable: Some(is_internet_reachable),
    }
  }

  /// Both flags are known
  pub fn is_definite(&self) -> bool {
    self.is_connected.is_some() && self.is_internet_reachable.is_some()
  }

  pub fn is_online(&self) -> bool {
    self.is_connected == Some(true) && self.is_internet_reachable == Some(true)
  }
}

/// Connectivity as tracked by the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectivityState {
  #[default]
  Unknown,
  Online,
  Offline,
}

impl ConnectivityState {
  pub fn is_online(self) -> bool {
    self == ConnectivityState::Online
  }
}

impl From<bool> for ConnectivityState {
  fn from(online: bool) -> Self {
    if online {
      ConnectivityState::Online
    } else {
      ConnectivityState::Offline
    }
  }
}

/// A source of events the cache can subscribe to.
///
/// Dropping the returned stream unsubscribes.
pub trait EventSource<E>: Send + Sync {
  fn subscribe(&self) -> BoxStream<'static, E>;
}

/// Broadcast-backed event source. Hosts push platform events in with `emit`.
pub struct EventFeed<E> {
  tx: broadcast::Sender<E>,
}

impl<E: Clone + Send + 'static> EventFeed<E> {
  pub fn new() -> Self {
    Self::with_capacity(DEFAULT_CAPACITY)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    let (tx, _) = broadcast::channel(capacity);
    Self { tx }
  }

  /// Deliver an event to all subscribers.
  ///
  /// Returns the number of subscribers that received it.
  pub fn emit(&self, event: E) -> usize {
    self.tx.send(event).unwrap_or(0)
  }

  pub fn subscriber_count(&self) -> usize {
    self.tx.receiver_count()
  }
}

impl<E: Clone + Send + 'static> Default for EventFeed<E> {
  fn default() -> Self {
    Self::new()
  }
}

impl<E: Clone + Send + 'static> EventSource<E> for EventFeed<E> {
  fn subscribe(&self) -> BoxStream<'static, E> {
    let rx = self.tx.subscribe();
    futures::stream::unfold(rx, |mut rx| async move {
      loop {
        match rx.recv().await {
          Ok(event) => return Some((event, rx)),
          Err(broadcast::error::RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "Event subscriber lagged, events dropped");
          }
          Err(broadcast::error::RecvError::Closed) => return None,
        }
      }
    })
    .boxed()
  }
}
