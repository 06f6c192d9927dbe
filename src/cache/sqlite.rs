//! SQLite-backed cache store.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::keys::CacheKey;
use super::store::{StoreError, SyncCacheStore};

/// Schema for the key-value table.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_cache (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-based cache store.
///
/// Each key is written in its own statement. There is no transaction across
/// keys, so a crash mid-persist can leave a mixed snapshot behind.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location.
  pub fn open() -> Result<Self, StoreError> {
    let path = Self::default_path()?;
    Self::open_at(&path)
  }

  /// Open or create the store at `path`.
  pub fn open_at(path: &Path) -> Result<Self, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    tracing::debug!(path = %path.display(), "Opened cache database");
    Self::with_connection(conn)
  }

  /// Open a private in-memory database.
  pub fn open_in_memory() -> Result<Self, StoreError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, StoreError> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf, StoreError> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| StoreError::Backend("Could not determine data directory".to_string()))?;

    Ok(data_dir.join("chat-cache").join("cache.db"))
  }

  fn run_migrations(&self) -> Result<(), StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(())
  }

  /// When `key` was last written, if it is present.
  pub fn cached_at(&self, key: CacheKey) -> Result<Option<DateTime<Utc>>, StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

    let cached_at: Option<String> = conn
      .query_row(
        "SELECT cached_at FROM kv_cache WHERE key = ?",
        params![key.as_str()],
        |row| row.get(0),
      )
      .optional()?;

    cached_at.as_deref().map(parse_datetime).transpose()
  }
}

impl SyncCacheStore for SqliteStore {
  fn get(&self, key: CacheKey) -> Result<Option<String>, StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

    let value = conn
      .query_row(
        "SELECT value FROM kv_cache WHERE key = ?",
        params![key.as_str()],
        |row| row.get(0),
      )
      .optional()?;

    Ok(value)
  }

  fn set(&self, key: CacheKey, value: &str) -> Result<(), StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

    conn.execute(
      "INSERT OR REPLACE INTO kv_cache (key, value, cached_at)
       VALUES (?, ?, datetime('now'))",
      params![key.as_str(), value],
    )?;

    tracing::debug!(key = %key, bytes = value.len(), "Stored cache value");
    Ok(())
  }

  fn remove(&self, key: CacheKey) -> Result<(), StoreError> {
    let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
    conn.execute("DELETE FROM kv_cache WHERE key = ?", params![key.as_str()])?;
    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| StoreError::Backend(format!("Failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_set_get_remove() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert_eq!(store.get(CacheKey::ClientData).unwrap(), None);

    store.set(CacheKey::ClientData, r#"{"user":{}}"#).unwrap();
    assert_eq!(
      store.get(CacheKey::ClientData).unwrap().as_deref(),
      Some(r#"{"user":{}}"#)
    );

    store.set(CacheKey::ClientData, "overwritten").unwrap();
    assert_eq!(
      store.get(CacheKey::ClientData).unwrap().as_deref(),
      Some("overwritten")
    );

    store.remove(CacheKey::ClientData).unwrap();
    assert_eq!(store.get(CacheKey::ClientData).unwrap(), None);
  }

  #[test]
  fn test_cached_at_tracks_writes() {
    let store = SqliteStore::open_in_memory().unwrap();
    assert_eq!(store.cached_at(CacheKey::SdkVersion).unwrap(), None);

    store.set(CacheKey::SdkVersion, "0.1.0").unwrap();
    let cached_at = store.cached_at(CacheKey::SdkVersion).unwrap().unwrap();
    assert!(Utc::now() - cached_at < chrono::Duration::minutes(1));
  }

  #[test]
  fn test_values_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let store = SqliteStore::open_at(&path).unwrap();
      store.set(CacheKey::ChannelsOrder, r#"{"a":0}"#).unwrap();
    }

    let store = SqliteStore::open_at(&path).unwrap();
    assert_eq!(
      store.get(CacheKey::ChannelsOrder).unwrap().as_deref(),
      Some(r#"{"a":0}"#)
    );
  }

  #[test]
  fn test_parse_datetime() {
    let parsed = parse_datetime("2024-03-01 12:30:00").unwrap();
    assert_eq!(parsed.to_rfc3339(), "2024-03-01T12:30:00+00:00");
    assert!(parse_datetime("yesterday").is_err());
  }
}
