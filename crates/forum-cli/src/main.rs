//! `forum` — command-line client for the event forum.
//!
//! # Usage
//!
//! ```
//! forum signup student@example.com
//! forum events --upcoming
//! forum vote e1 yes
//! forum --config ~/.config/forum/forum.toml stats e1
//! ```

mod app;
mod command;
mod config;
mod render;

use std::{io, path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::Context as _;
use app::App;
use clap::Parser;
use command::Command;
use config::ClientConfig;
use forum_core::{
  gateway::{AuthService, DocumentStore},
  memory::MemoryGateway,
};
use forum_store_sqlite::SqliteGateway;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "forum", author, version, about = "Browse and vote on forum events")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "forum.toml")]
  config: PathBuf,

  /// Use a throwaway in-memory store instead of the SQLite file.
  #[arg(long)]
  memory: bool,

  #[command(subcommand)]
  command: Command,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
  // Logs go to stderr so command output stays clean.
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let cfg = ClientConfig::load(&cli.config)?;

  if cli.memory {
    return run(MemoryGateway::new(), &cfg, &cli.command).await;
  }

  if let Some(parent) = cfg.store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)
      .with_context(|| format!("failed to create {}", parent.display()))?;
  }

  let store = SqliteGateway::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;
  run(store, &cfg, &cli.command).await
}

async fn run<G>(gateway: G, cfg: &ClientConfig, command: &Command) -> anyhow::Result<ExitCode>
where
  G: DocumentStore + AuthService + 'static,
{
  let app = App::new(Arc::new(gateway), &cfg.admin_domain);
  app.execute(command, &mut io::stdout().lock()).await
}
