//! Client configuration: an optional TOML file overlaid with `FORUM_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use forum_core::user::DEFAULT_ADMIN_DOMAIN;
use serde::Deserialize;

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
  /// SQLite file holding documents, identities and the session.
  #[serde(default = "default_store_path")]
  pub store_path:   PathBuf,
  /// Email suffix that marks an account as an administrator.
  #[serde(default = "default_admin_domain")]
  pub admin_domain: String,
}

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/forum/forum.db") }

fn default_admin_domain() -> String { DEFAULT_ADMIN_DOMAIN.to_owned() }

impl ClientConfig {
  /// Read `path` if it exists, then apply `FORUM_*` overrides. The store
  /// path comes back with `~` expanded.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("FORUM"))
      .build()
      .context("failed to read config file")?;

    let mut cfg: Self = settings
      .try_deserialize()
      .context("failed to deserialise ClientConfig")?;
    cfg.store_path = expand_tilde(&cfg.store_path);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
