mod commands;

use chat_cache::config::Config;
use chat_cache::logging;
use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "chat-cache")]
#[command(about = "Inspect and maintain the offline chat cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/chat-cache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Override the cache database path
  #[arg(short, long)]
  store: Option<PathBuf>,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override store path if specified on command line
  if let Some(store) = args.store {
    config.store.path = Some(store);
  }

  let _guard = logging::init(&config.log)?;

  commands::run(args.command, &config, &mut std::io::stdout()).await
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_parse_subcommand() {
    let args = Args::try_parse_from(["chat-cache", "--store", "/tmp/c.db", "inspect"]).unwrap();
    assert_eq!(args.command, commands::Command::Inspect);
    assert_eq!(args.store, Some(PathBuf::from("/tmp/c.db")));
  }

  #[test]
  fn test_subcommand_required() {
    assert!(Args::try_parse_from(["chat-cache"]).is_err());
  }
}
