use chat_cache::cache::version::SDK_VERSION;
use chat_cache::cache::{clear_store, Blocking, CacheKey, CacheReport, SqliteStore};
use chat_cache::config::Config;
use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use std::io::Write;

/// Maintenance commands over the on-disk cache
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Summarize what is cached
  Inspect,
  /// Remove all cached data
  Clear,
  /// Print the cache database path
  Path,
}

/// Run a command, writing its output to `out`.
pub async fn run(command: Command, config: &Config, out: &mut impl Write) -> Result<()> {
  let path = config.store_path()?;

  match command {
    Command::Path => {
      writeln!(out, "{}", path.display())?;
    }
    Command::Inspect => {
      let store = open(config)?;
      let report = CacheReport::load(&store).await?;
      write!(out, "{}", report)?;

      if !report.is_empty() {
        let written_by_this_sdk = report.sdk_version.as_deref() == Some(SDK_VERSION);
        writeln!(
          out,
          "written by this sdk:    {}",
          if written_by_this_sdk { "yes" } else { "no" }
        )?;
        writeln!(
          out,
          "cropped on restore:     {} messages (keeps {} per channel)",
          report.cropped_messages(&config.limits),
          config.limits.max_messages_per_channel
        )?;
        for key in CacheKey::ALL {
          if let Some(cached_at) = store.inner().cached_at(key)? {
            writeln!(out, "  {:<24} cached at {}", key, cached_at.to_rfc3339())?;
          }
        }
      }
    }
    Command::Clear => {
      let store = open(config)?;
      clear_store(&store).await?;
      tracing::info!(path = %path.display(), "Cleared offline cache");
      writeln!(out, "cleared {}", path.display())?;
    }
  }

  Ok(())
}

fn open(config: &Config) -> Result<Blocking<SqliteStore>> {
  let path = config.store_path()?;
  let store = SqliteStore::open_at(&path)
    .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;
  Ok(Blocking::new(store))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chat_cache::cache::SyncCacheStore;

  fn config_in(dir: &tempfile::TempDir) -> Config {
    let mut config = Config::default();
    config.store.path = Some(dir.path().join("cache.db"));
    config
  }

  async fn output(command: Command, config: &Config) -> String {
    let mut out = Vec::new();
    run(command, config, &mut out).await.unwrap();
    String::from_utf8(out).unwrap()
  }

  #[tokio::test]
  async fn test_path() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let printed = output(Command::Path, &config).await;
    assert_eq!(printed.trim(), dir.path().join("cache.db").display().to_string());
  }

  #[tokio::test]
  async fn test_inspect_empty() {
    let dir = tempfile::tempdir().unwrap();
    let printed = output(Command::Inspect, &config_in(&dir)).await;
    assert_eq!(printed, "cache is empty\n");
  }

  #[tokio::test]
  async fn test_inspect_reports_configured_crop() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_in(&dir);
    config.limits.max_messages_per_channel = 1;
    {
      let store = SqliteStore::open_at(&config.store_path().unwrap()).unwrap();
      store
        .set(
          CacheKey::ChannelsData,
          r#"[{"id":"c0","type":"messaging","messages":[{"id":"m0"},{"id":"m1"},{"id":"m2"}]}]"#,
        )
        .unwrap();
    }

    let printed = output(Command::Inspect, &config).await;
    assert!(printed.contains("cropped on restore:     2 messages (keeps 1 per channel)"));
  }

  #[tokio::test]
  async fn test_inspect_then_clear() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    {
      let store = SqliteStore::open_at(&config.store_path().unwrap()).unwrap();
      store.set(CacheKey::SdkVersion, SDK_VERSION).unwrap();
      store
        .set(
          CacheKey::ClientData,
          r#"{"user":{"id":"u1","name":"Ada"},"anonymous":false}"#,
        )
        .unwrap();
    }

    let printed = output(Command::Inspect, &config).await;
    assert!(printed.contains("u1"));
    assert!(printed.contains("written by this sdk:    yes"));
    assert!(printed.contains("client-data"));

    output(Command::Clear, &config).await;
    let printed = output(Command::Inspect, &config).await;
    assert_eq!(printed, "cache is empty\n");
  }
}
