//! Offline cache coordinator.

use futures::future::join_all;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, watch};

use super::keys::CacheKey;
use super::order::ChannelOrder;
use super::store::CacheStore;
use super::truncate::TruncationLimits;
use super::version::VersionStamp;
use super::watchers::Watchers;
use crate::chat::client::{ChatClient, TokenOrProvider};
use crate::chat::types::{ChannelSnapshot, ClientSnapshot, OrderedChannel, UserIdentity};
use crate::error::{CacheError, Result};
use crate::event::{AppState, ConnectivityState, EventSource, NetworkState};

/// Set once the process-wide cache exists.
static CREATED: AtomicBool = AtomicBool::new(false);

const EVENT_CAPACITY: usize = 64;

/// Observable outcomes of background cache work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  /// A backgrounding snapshot was written
  Persisted { channels: usize },
  /// Writing a backgrounding snapshot failed
  PersistFailed { error: String },
  /// Cached state was handed back to the client
  Restored { channels: usize },
  /// Cached data was discarded
  Invalidated { reason: String },
  Reconnected,
  ReconnectFailed { error: String },
  WentOffline,
}

/// What `rehydrate` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rehydration {
  /// State was restored into the client
  Restored { channels: usize, messages: usize },
  /// No cached channels were found
  Missing,
  /// Cached data was written by other versions and has been cleared
  VersionMismatch,
  /// Cached data could not be decoded and has been cleared
  Corrupt,
}

/// What `initialize` did.
#[derive(Debug)]
pub enum Initialization<T> {
  /// No cached client data, nothing was started
  NoCache,
  /// Connected live while rehydrating
  Online { connection: T, rehydration: Rehydration },
  /// Installed the cached session locally while rehydrating
  Offline { rehydration: Rehydration },
}

#[derive(Debug, Default)]
pub(super) struct SharedState {
  pub(super) connectivity: ConnectivityState,
  pub(super) cached_order: Option<ChannelOrder>,
  /// Bumped by every `sync_channels_cached_order`
  pub(super) order_generation: u64,
}

/// Coordinates persisted chat state with the live client.
///
/// Created through [`OfflineCacheBuilder`] (or once per process through
/// [`create_offline_cache`]) and shared as an `Arc`. Watcher tasks hold only
/// weak references and are aborted when the cache is dropped.
pub struct OfflineCache<C: ChatClient, S: CacheStore> {
  pub(super) client: Arc<C>,
  pub(super) store: S,
  pub(super) token: TokenOrProvider,
  pub(super) limits: TruncationLimits,
  pub(super) versions: VersionStamp,
  pub(super) state: Mutex<SharedState>,
  /// Written once, by the first definite connectivity reading
  pub(super) initial_network: watch::Sender<Option<bool>>,
  pub(super) events: broadcast::Sender<CacheEvent>,
  pub(super) lifecycle: Option<Arc<dyn EventSource<AppState>>>,
  pub(super) connectivity: Option<Arc<dyn EventSource<NetworkState>>>,
  pub(super) watchers: Mutex<Watchers>,
}

impl<C: ChatClient, S: CacheStore> OfflineCache<C, S> {
  pub fn builder() -> OfflineCacheBuilder<C, S> {
    OfflineCacheBuilder::new()
  }

  /// Restore cached state and connect.
  ///
  /// Waits for the first connectivity reading. Online, connects and
  /// rehydrates concurrently; offline, installs the cached session locally
  /// and rehydrates. Both branches always run to completion.
  pub async fn initialize(&self) -> Result<Initialization<C::Connected>> {
    let client_data = match self.read_client_snapshot().await? {
      Some(client_data) => client_data,
      None => {
        tracing::info!("No cached client data, skipping offline initialization");
        return Ok(Initialization::NoCache);
      }
    };

    let online = self.initial_connectivity().await;
    tracing::debug!(online, "Initializing from cache");

    if online {
      let (connected, rehydrated) =
        futures::join!(self.connect(&client_data), self.rehydrate(&client_data));
      let (connection, rehydration) = settle(connected, rehydrated)?;
      Ok(Initialization::Online {
        connection,
        rehydration,
      })
    } else {
      let (session, rehydrated) = futures::join!(
        self.offline_connect(&client_data),
        self.rehydrate(&client_data)
      );
      let ((), rehydration) = settle(session, rehydrated)?;
      Ok(Initialization::Offline { rehydration })
    }
  }

  /// Restore cached channels into the client, if they are compatible.
  pub async fn rehydrate(&self, client_data: &ClientSnapshot<C::User>) -> Result<Rehydration> {
    let channels_data = self.read(CacheKey::ChannelsData).await?;
    let cached_sdk = self.read(CacheKey::SdkVersion).await?;
    let cached_client_library = self.read(CacheKey::ClientLibraryVersion).await?;
    let cached_order = self.read(CacheKey::ChannelsOrder).await?;
    let generation = self.shared().order_generation;

    let Some(channels_data) = channels_data else {
      tracing::info!("No cached channels data, skipping offline initialization");
      return Ok(Rehydration::Missing);
    };

    if !self
      .versions
      .matches(cached_sdk.as_deref(), cached_client_library.as_deref())
    {
      tracing::info!(
        cached_sdk = ?cached_sdk,
        cached_client_library = ?cached_client_library,
        sdk = %self.versions.sdk,
        client_library = %self.versions.client_library,
        "Version change detected, skipping offline initialization and cleaning up cache"
      );
      self.invalidate("version mismatch").await?;
      return Ok(Rehydration::VersionMismatch);
    }

    let channels: Vec<ChannelSnapshot<C::Message>> = match serde_json::from_str(&channels_data) {
      Ok(channels) => channels,
      Err(e) => {
        tracing::warn!(error = %e, "Cached channels data is unreadable, cleaning up cache");
        self.invalidate("unreadable channels data").await?;
        return Ok(Rehydration::Corrupt);
      }
    };

    let order = cached_order.and_then(|raw| match serde_json::from_str::<ChannelOrder>(&raw) {
      Ok(order) => Some(order),
      Err(e) => {
        tracing::warn!(error = %e, "Ignoring unreadable cached channel order");
        None
      }
    });

    let channels = self.limits.crop_older_messages(channels);
    let channel_count = channels.len();
    let message_count: usize = channels.iter().map(|c| c.messages.len()).sum();

    self
      .client
      .restore_state(client_data.clone(), channels)
      .await?;

    if order.is_some() {
      // A sync during the restore is newer than anything on disk
      let mut shared = self.shared();
      if shared.order_generation == generation {
        shared.cached_order = order;
      } else {
        tracing::debug!("Channel order synced during restore, keeping it");
      }
    }

    tracing::info!(
      channels = channel_count,
      messages = message_count,
      "Restored chat state from cache"
    );
    self.emit(CacheEvent::Restored {
      channels: channel_count,
    });

    Ok(Rehydration::Restored {
      channels: channel_count,
      messages: message_count,
    })
  }

  /// Authenticate and connect as the cached user.
  ///
  /// Returns whatever the client's connect resolves to.
  pub async fn connect(&self, client_data: &ClientSnapshot<C::User>) -> Result<C::Connected> {
    let user = UserIdentity::from_user(&client_data.user);
    Ok(self.client.connect_user(user, &self.token).await?)
  }

  /// Install the cached session on the client without a network round trip,
  /// so cached content can render before (or without) a live connection.
  pub async fn offline_connect(&self, client_data: &ClientSnapshot<C::User>) -> Result<()> {
    let user = UserIdentity::from_user(&client_data.user);

    self.client.set_user_id(&user.id);
    self.client.set_anonymous(false);
    self.client.set_token(&user, &self.token).await?;
    self.client.set_user(&user);

    tracing::debug!(user_id = %user.id, "Installed cached session offline");
    Ok(())
  }

  /// Snapshot the client and write it to the store.
  ///
  /// Keys are written in order: sdk version, client library version, client
  /// data, channels data, channel order. Anonymous sessions are not cached.
  pub async fn persist(&self) -> Result<()> {
    let snapshot = self.client.state_snapshot();
    if snapshot.client.anonymous {
      tracing::debug!("Anonymous session, not persisting chat state");
      return Ok(());
    }

    let client_data = encode(CacheKey::ClientData, &snapshot.client)?;
    let channels_data = encode(CacheKey::ChannelsData, &snapshot.channels)?;
    let order_data = self
      .cached_order()
      .map(|order| encode(CacheKey::ChannelsOrder, &order))
      .transpose()?;

    self
      .write(CacheKey::SdkVersion, self.versions.sdk.clone())
      .await?;
    self
      .write(
        CacheKey::ClientLibraryVersion,
        self.versions.client_library.clone(),
      )
      .await?;
    self.write(CacheKey::ClientData, client_data).await?;
    self.write(CacheKey::ChannelsData, channels_data).await?;
    match order_data {
      Some(order_data) => self.write(CacheKey::ChannelsOrder, order_data).await?,
      None => self
        .store
        .remove(CacheKey::ChannelsOrder)
        .await
        .map_err(CacheError::store(CacheKey::ChannelsOrder))?,
    }

    let channels = snapshot.channels.len();
    tracing::info!(channels, "Persisted chat state");
    self.emit(CacheEvent::Persisted { channels });
    Ok(())
  }

  /// Whether a client snapshot has been persisted.
  pub async fn has_cached_data(&self) -> Result<bool> {
    Ok(self.read(CacheKey::ClientData).await?.is_some())
  }

  /// Remember the given channel ordering.
  pub fn sync_channels_cached_order<Ch: OrderedChannel>(&self, channels: &[Ch]) {
    let order = ChannelOrder::from_channels(channels);
    tracing::debug!(channels = order.len(), "Synced cached channel order");
    let mut shared = self.shared();
    shared.cached_order = Some(order);
    shared.order_generation += 1;
  }

  /// Sort channels by the remembered ordering. Without one, returns the input as is.
  pub fn order_channels_based_on_cached_order<Ch: OrderedChannel>(
    &self,
    channels: Vec<Ch>,
  ) -> Vec<Ch> {
    match &self.shared().cached_order {
      Some(order) => order.apply(channels),
      None => channels,
    }
  }

  /// Remove every cached key.
  ///
  /// Removals are issued concurrently; the first failure is returned.
  pub async fn clear(&self) -> Result<()> {
    clear_store(&self.store).await
  }

  pub fn cached_order(&self) -> Option<ChannelOrder> {
    self.shared().cached_order.clone()
  }

  pub fn connectivity(&self) -> ConnectivityState {
    self.shared().connectivity
  }

  pub fn versions(&self) -> &VersionStamp {
    &self.versions
  }

  /// Subscribe to background cache events.
  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.events.subscribe()
  }

  pub fn client(&self) -> &Arc<C> {
    &self.client
  }

  pub(super) fn shared(&self) -> MutexGuard<'_, SharedState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub(super) fn emit(&self, event: CacheEvent) {
    // No subscribers is fine
    let _ = self.events.send(event);
  }

  /// Resolves once the first definite connectivity reading arrives.
  async fn initial_connectivity(&self) -> bool {
    let mut rx = self.initial_network.subscribe();
    rx.wait_for(Option::is_some)
      .await
      .map(|resolved| *resolved)
      .ok()
      .flatten()
      .unwrap_or(false)
  }

  async fn read_client_snapshot(&self) -> Result<Option<ClientSnapshot<C::User>>> {
    let Some(raw) = self.read(CacheKey::ClientData).await? else {
      return Ok(None);
    };

    match serde_json::from_str(&raw) {
      Ok(client_data) => Ok(Some(client_data)),
      Err(e) => {
        tracing::warn!(error = %e, "Cached client data is unreadable, cleaning up cache");
        self.invalidate("unreadable client data").await?;
        Ok(None)
      }
    }
  }

  async fn invalidate(&self, reason: &str) -> Result<()> {
    self.clear().await?;
    self.shared().cached_order = None;
    self.emit(CacheEvent::Invalidated {
      reason: reason.to_string(),
    });
    Ok(())
  }

  async fn read(&self, key: CacheKey) -> Result<Option<String>> {
    self.store.get(key).await.map_err(CacheError::store(key))
  }

  async fn write(&self, key: CacheKey, value: String) -> Result<()> {
    self
      .store
      .set(key, value)
      .await
      .map_err(CacheError::store(key))
  }
}

impl<C: ChatClient, S: CacheStore> Drop for OfflineCache<C, S> {
  fn drop(&mut self) {
    if let Ok(watchers) = self.watchers.get_mut() {
      watchers.abort();
    }
  }
}

/// Remove every cached key from `store`.
pub async fn clear_store<S: CacheStore + ?Sized>(store: &S) -> Result<()> {
  let removals = CacheKey::ALL
    .iter()
    .map(|&key| async move { store.remove(key).await.map_err(CacheError::store(key)) });

  join_all(removals).await.into_iter().collect::<Result<Vec<()>>>()?;
  tracing::debug!("Cleared offline cache");
  Ok(())
}

fn encode<T: serde::Serialize>(key: CacheKey, value: &T) -> Result<String> {
  serde_json::to_string(value).map_err(|source| CacheError::Encode { key, source })
}

/// Combine two concurrently awaited results.
fn settle<A, B>(a: Result<A>, b: Result<B>) -> Result<(A, B)> {
  match (a, b) {
    (Ok(a), Ok(b)) => Ok((a, b)),
    (Err(e), Ok(_)) | (Ok(_), Err(e)) => Err(e),
    (Err(a), Err(b)) => Err(CacheError::Multiple(vec![a, b])),
  }
}

/// Builder for [`OfflineCache`].
pub struct OfflineCacheBuilder<C: ChatClient, S: CacheStore> {
  client: Option<Arc<C>>,
  store: Option<S>,
  token: Option<TokenOrProvider>,
  lifecycle: Option<Arc<dyn EventSource<AppState>>>,
  connectivity: Option<Arc<dyn EventSource<NetworkState>>>,
  limits: TruncationLimits,
  versions: Option<VersionStamp>,
}

impl<C: ChatClient, S: CacheStore> Default for OfflineCacheBuilder<C, S> {
  fn default() -> Self {
    Self {
      client: None,
      store: None,
      token: None,
      lifecycle: None,
      connectivity: None,
      limits: TruncationLimits::default(),
      versions: None,
    }
  }
}

impl<C: ChatClient, S: CacheStore> OfflineCacheBuilder<C, S> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn client(mut self, client: Arc<C>) -> Self {
    self.client = Some(client);
    self
  }

  pub fn store(mut self, store: S) -> Self {
    self.store = Some(store);
    self
  }

  pub fn token(mut self, token: impl Into<TokenOrProvider>) -> Self {
    self.token = Some(token.into());
    self
  }

  /// App lifecycle transitions; backgrounding persists the cache.
  pub fn lifecycle(mut self, source: Arc<dyn EventSource<AppState>>) -> Self {
    self.lifecycle = Some(source);
    self
  }

  /// Connectivity readings; the first definite one unblocks `initialize`.
  pub fn connectivity(mut self, source: Arc<dyn EventSource<NetworkState>>) -> Self {
    self.connectivity = Some(source);
    self
  }

  pub fn limits(mut self, limits: TruncationLimits) -> Self {
    self.limits = limits;
    self
  }

  /// Override the versions recorded with snapshots.
  pub fn versions(mut self, versions: VersionStamp) -> Self {
    self.versions = Some(versions);
    self
  }

  /// Build the cache. Watchers are not started.
  pub fn build(self) -> Result<Arc<OfflineCache<C, S>>> {
    let client = self.client.ok_or(CacheError::MissingCollaborator("chat client"))?;
    let store = self.store.ok_or(CacheError::MissingCollaborator("cache store"))?;
    let token = self
      .token
      .ok_or(CacheError::MissingCollaborator("token or token provider"))?;

    let versions = self
      .versions
      .unwrap_or_else(|| VersionStamp::current(client.library_version()));
    let (initial_network, _) = watch::channel(None);
    let (events, _) = broadcast::channel(EVENT_CAPACITY);

    Ok(Arc::new(OfflineCache {
      client,
      store,
      token,
      limits: self.limits,
      versions,
      state: Mutex::new(SharedState::default()),
      initial_network,
      events,
      lifecycle: self.lifecycle,
      connectivity: self.connectivity,
      watchers: Mutex::new(Watchers::default()),
    }))
  }
}

/// Create the process-wide cache and start its watchers.
///
/// Only the first successful call creates a cache; later calls fail with
/// [`CacheError::AlreadyCreated`]. A call that fails validation does not
/// claim the slot. Watchers are spawned onto the current tokio runtime, so
/// with event sources configured this must be called from within one;
/// otherwise it fails with [`CacheError::NoRuntime`].
pub fn create_offline_cache<C: ChatClient, S: CacheStore + 'static>(
  builder: OfflineCacheBuilder<C, S>,
) -> Result<Arc<OfflineCache<C, S>>> {
  let has_sources = builder.lifecycle.is_some() || builder.connectivity.is_some();
  if has_sources && tokio::runtime::Handle::try_current().is_err() {
    return Err(CacheError::NoRuntime);
  }

  if CREATED
    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
    .is_err()
  {
    return Err(CacheError::AlreadyCreated);
  }

  match builder.build() {
    Ok(cache) => {
      cache.start_watchers();
      Ok(cache)
    }
    Err(e) => {
      CREATED.store(false, Ordering::SeqCst);
      Err(e)
    }
  }
}
