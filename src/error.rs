use crate::cache::keys::CacheKey;
use crate::cache::store::StoreError;
use crate::chat::client::ClientError;

/// Errors surfaced by the offline cache.
///
/// Missing or outdated cache data is not an error; see `Rehydration`.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  /// A required collaborator was not supplied to the builder
  #[error("offline cache requires a {0}")]
  MissingCollaborator(&'static str),

  /// The process-wide cache has already been created
  #[error("offline cache has already been created for this process")]
  AlreadyCreated,

  /// Watchers were requested outside a tokio runtime
  #[error("offline cache watchers need a running tokio runtime")]
  NoRuntime,

  #[error("store failure on {key}: {source}")]
  Store {
    key: CacheKey,
    #[source]
    source: StoreError,
  },

  #[error("failed to encode {key}: {source}")]
  Encode {
    key: CacheKey,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Client(#[from] ClientError),

  /// Several concurrent steps failed
  #[error("{} cache operations failed: {}", .0.len(), join_errors(.0))]
  Multiple(Vec<CacheError>),
}

impl CacheError {
  pub(crate) fn store(key: CacheKey) -> impl FnOnce(StoreError) -> CacheError {
    move |source| CacheError::Store { key, source }
  }
}

fn join_errors(errors: &[CacheError]) -> String {
  errors
    .iter()
    .map(ToString::to_string)
    .collect::<Vec<_>>()
    .join("; ")
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;
