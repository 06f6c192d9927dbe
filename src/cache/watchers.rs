//! Lifecycle and connectivity watchers.
//!
//! Each event source gets one task. Tasks hold a weak reference to the cache
//! so they never keep it alive, and are aborted when it is dropped.

use futures::StreamExt;
use std::sync::{Arc, PoisonError};
use tokio::task::JoinHandle;

use super::offline::{CacheEvent, OfflineCache};
use super::store::CacheStore;
use crate::chat::client::ChatClient;
use crate::error::Result;
use crate::event::{AppState, ConnectivityState, NetworkState};

#[derive(Default)]
pub(crate) struct Watchers {
  started: bool,
  handles: Vec<JoinHandle<()>>,
}

impl Watchers {
  pub(super) fn abort(&mut self) {
    for handle in self.handles.drain(..) {
      handle.abort();
    }
  }
}

impl<C: ChatClient, S: CacheStore + 'static> OfflineCache<C, S> {
  /// Subscribe to the configured event sources.
  ///
  /// Returns `false` (and does nothing) if watchers were already started.
  pub fn start_watchers(self: &Arc<Self>) -> bool {
    let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
    if watchers.started {
      tracing::warn!("Offline cache watchers already started");
      return false;
    }
    watchers.started = true;

    if let Some(source) = &self.lifecycle {
      let mut states = source.subscribe();
      let weak = Arc::downgrade(self);
      watchers.handles.push(tokio::spawn(async move {
        while let Some(state) = states.next().await {
          let Some(cache) = weak.upgrade() else {
            break;
          };
          // Failures are logged and reported as CacheEvent::PersistFailed
          let _ = cache.handle_app_state(state).await;
        }
      }));
    }

    if let Some(source) = &self.connectivity {
      let mut readings = source.subscribe();
      let weak = Arc::downgrade(self);
      watchers.handles.push(tokio::spawn(async move {
        while let Some(network) = readings.next().await {
          let Some(cache) = weak.upgrade() else {
            break;
          };
          cache.report_connectivity(network).await;
        }
      }));
    }

    tracing::debug!(tasks = watchers.handles.len(), "Started offline cache watchers");
    true
  }

  /// Stop watcher tasks and drop their subscriptions.
  pub async fn stop_watchers(&self) {
    let handles: Vec<JoinHandle<()>> = {
      let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
      watchers.handles.drain(..).collect()
    };

    for handle in handles {
      handle.abort();
      let _ = handle.await;
    }
  }

  /// Persist when the app moves to the background.
  pub async fn handle_app_state(&self, state: AppState) -> Result<()> {
    if !state.is_backgrounding() {
      return Ok(());
    }

    if let Err(e) = self.persist().await {
      tracing::warn!(error = %e, ?state, "Failed to persist chat state");
      self.emit(CacheEvent::PersistFailed {
        error: e.to_string(),
      });
      return Err(e);
    }
    Ok(())
  }

  /// Track a connectivity reading.
  ///
  /// The first definite reading resolves the initial connectivity that
  /// `initialize` waits on. After that, coming online reopens the client's
  /// connection and going offline only updates tracking.
  pub async fn report_connectivity(&self, network: NetworkState) {
    let transition = {
      let mut shared = self.shared();
      match shared.connectivity {
        ConnectivityState::Unknown => {
          if network.is_definite() {
            let online = network.is_online();
            shared.connectivity = online.into();
            self.initial_network.send_replace(Some(online));
            tracing::info!(online, "Initial connectivity resolved");
          }
          None
        }
        current if network.is_online() && !current.is_online() => {
          shared.connectivity = ConnectivityState::Online;
          Some(ConnectivityState::Online)
        }
        current if !network.is_online() && current.is_online() => {
          shared.connectivity = ConnectivityState::Offline;
          Some(ConnectivityState::Offline)
        }
        _ => None,
      }
    };

    match transition {
      Some(ConnectivityState::Online) => {
        tracing::info!("Connectivity restored, reopening connection");
        match self.client.open_connection().await {
          Ok(()) => self.emit(CacheEvent::Reconnected),
          Err(e) => {
            tracing::warn!(error = %e, "Failed to reopen connection");
            self.emit(CacheEvent::ReconnectFailed {
              error: e.to_string(),
            });
          }
        }
      }
      Some(ConnectivityState::Offline) => {
        tracing::info!("Connectivity lost");
        self.emit(CacheEvent::WentOffline);
      }
      _ => {}
    }
  }
}
