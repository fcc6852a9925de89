//! Configuration for the embedded store.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Where the SQLite database lives.
///
/// Loaded from an optional TOML file, overridden by `IMS_SQLITE_*`
/// environment variables (`IMS_SQLITE_PATH`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteConfig {
  /// Database file; `:memory:` opens a private in-memory database.
  #[serde(default = "default_path")]
  pub path: PathBuf,
}

fn default_path() -> PathBuf { PathBuf::from("ims.sqlite") }

impl Default for SqliteConfig {
  fn default() -> Self { Self { path: default_path() } }
}

impl SqliteConfig {
  pub fn load(file: Option<&Path>) -> Result<Self> {
    let mut builder = config::Config::builder();
    if let Some(file) = file {
      builder = builder.add_source(config::File::from(file).required(false));
    }
    let settings = builder
      .add_source(config::Environment::with_prefix("IMS_SQLITE"))
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  /// The database path with a leading `~` expanded to the home directory.
  pub fn resolved_path(&self) -> PathBuf {
    let s = self.path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/")
      && let Ok(home) = std::env::var("HOME")
    {
      return PathBuf::from(home).join(rest);
    }
    self.path.clone()
  }

  pub fn is_in_memory(&self) -> bool { self.path.as_os_str() == ":memory:" }
}
