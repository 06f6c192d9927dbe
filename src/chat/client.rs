//! The chat client surface the cache drives.
//!
//! The cache never owns the client's lifecycle. It reads snapshots out of it,
//! hands truncated snapshots back, and asks it to connect.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;

use super::types::{
  CachedMessage, CachedUser, ChannelSnapshot, ClientSnapshot, StateSnapshot, UserIdentity,
};

/// Errors reported by the chat client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
  #[error("connection failed: {0}")]
  Connect(String),
  #[error("authentication failed: {0}")]
  Auth(String),
  #[error("token provider failed: {0}")]
  Token(String),
  #[error("state restore failed: {0}")]
  Restore(String),
}

type TokenFuture = BoxFuture<'static, Result<String, ClientError>>;

/// A static token or a callback that produces one on demand.
#[derive(Clone)]
pub enum TokenOrProvider {
  Token(String),
  Provider(Arc<dyn Fn() -> TokenFuture + Send + Sync>),
}

impl TokenOrProvider {
  /// Wrap an async token callback.
  pub fn provider<F, Fut>(f: F) -> Self
  where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String, ClientError>> + Send + 'static,
  {
    Self::Provider(Arc::new(move || -> TokenFuture { Box::pin(f()) }))
  }

  /// Produce a token, calling the provider if there is one.
  pub async fn resolve(&self) -> Result<String, ClientError> {
    match self {
      Self::Token(token) => Ok(token.clone()),
      Self::Provider(provider) => provider().await,
    }
  }
}

impl std::fmt::Debug for TokenOrProvider {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Token(_) => f.write_str("Token(<redacted>)"),
      Self::Provider(_) => f.write_str("Provider(..)"),
    }
  }
}

impl From<String> for TokenOrProvider {
  fn from(token: String) -> Self {
    Self::Token(token)
  }
}

/// Chat client collaborator.
///
/// Methods take `&self`; implementations keep their own interior state.
#[async_trait]
pub trait ChatClient: Send + Sync + 'static {
  type User: CachedUser;
  type Message: CachedMessage;
  /// Whatever `connect_user` resolves to, passed back to callers unmodified
  type Connected: Send + 'static;

  /// Version of the client library, recorded next to persisted snapshots.
  fn library_version(&self) -> String;

  /// Current client + channel state.
  fn state_snapshot(&self) -> StateSnapshot<Self::User, Self::Message>;

  /// Replace in-memory state with a restored snapshot.
  async fn restore_state(
    &self,
    client: ClientSnapshot<Self::User>,
    channels: Vec<ChannelSnapshot<Self::Message>>,
  ) -> Result<(), ClientError>;

  /// Open or resume the live connection for the current session.
  async fn open_connection(&self) -> Result<(), ClientError>;

  /// Authenticate and connect.
  async fn connect_user(
    &self,
    user: UserIdentity,
    token: &TokenOrProvider,
  ) -> Result<Self::Connected, ClientError>;

  // Low-level session install, bypassing the network round trip.

  fn set_user_id(&self, user_id: &str);

  fn set_anonymous(&self, anonymous: bool);

  async fn set_token(&self, user: &UserIdentity, token: &TokenOrProvider)
    -> Result<(), ClientError>;

  fn set_user(&self, user: &UserIdentity);
}
