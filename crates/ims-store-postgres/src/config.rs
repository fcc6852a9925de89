//! Configuration for the networked store.

use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::{Error, Result};

/// How to reach the PostgreSQL server.
///
/// Loaded from an optional TOML file, overridden by `IMS_POSTGRES_*`
/// environment variables (`IMS_POSTGRES_URL`, `IMS_POSTGRES_SCHEMA`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostgresConfig {
  #[serde(default = "default_url")]
  pub url:                     String,
  #[serde(default = "default_max_connections")]
  pub max_connections:         u32,
  #[serde(default = "default_acquire_timeout")]
  pub acquire_timeout_seconds: u64,
  /// Pins the `search_path` of every pooled connection.
  #[serde(default)]
  pub schema:                  Option<String>,
}

fn default_url() -> String { "postgres://localhost/ims".to_owned() }
fn default_max_connections() -> u32 { 10 }
fn default_acquire_timeout() -> u64 { 30 }

impl Default for PostgresConfig {
  fn default() -> Self {
    Self {
      url:                     default_url(),
      max_connections:         default_max_connections(),
      acquire_timeout_seconds: default_acquire_timeout(),
      schema:                  None,
    }
  }
}

impl PostgresConfig {
  pub fn load(file: Option<&Path>) -> Result<Self> {
    let mut builder = config::Config::builder();
    if let Some(file) = file {
      builder = builder.add_source(config::File::from(file).required(false));
    }
    let settings = builder
      .add_source(config::Environment::with_prefix("IMS_POSTGRES"))
      .build()?;
    Ok(settings.try_deserialize()?)
  }

  pub fn acquire_timeout(&self) -> Duration {
    Duration::from_secs(self.acquire_timeout_seconds)
  }

  /// The configured schema, checked to be safe to splice into `SET
  /// search_path`.
  pub fn search_path(&self) -> Result<Option<&str>> {
    match self.schema.as_deref() {
      None => Ok(None),
      Some(name) if is_identifier(name) => Ok(Some(name)),
      Some(name) => Err(Error::InvalidSchemaName(name.to_owned())),
    }
  }
}

fn is_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  chars
    .next()
    .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    && name.len() <= 63
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use super::*;

  #[test]
  fn missing_file_falls_back_to_default() {
    let config =
      PostgresConfig::load(Some(Path::new("/nonexistent/ims.toml"))).unwrap();
    assert_eq!(config.max_connections, 10);
    assert_eq!(config.acquire_timeout(), Duration::from_secs(30));
  }

  #[test]
  fn file_sets_fields() {
    let dir = std::env::temp_dir()
      .join(format!("ims-postgres-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("store.toml");
    let mut f = std::fs::File::create(&file).unwrap();
    writeln!(f, "url = \"postgres://ims@db/ims\"").unwrap();
    writeln!(f, "max_connections = 3").unwrap();
    writeln!(f, "schema = \"ims_2024\"").unwrap();

    let config = PostgresConfig::load(Some(&file)).unwrap();
    assert_eq!(config.url, "postgres://ims@db/ims");
    assert_eq!(config.max_connections, 3);
    assert_eq!(config.search_path().unwrap(), Some("ims_2024"));
    std::fs::remove_dir_all(&dir).unwrap();
  }

  #[test]
  fn schema_must_be_an_identifier() {
    let config = PostgresConfig {
      schema: Some("ims; drop table EVENT".into()),
      ..Default::default()
    };
    assert!(matches!(config.search_path(), Err(Error::InvalidSchemaName(_))));

    for bad in ["", "1abc", "a-b", "\"quoted\""] {
      assert!(!is_identifier(bad), "{bad:?}");
    }
    assert!(is_identifier("_ims_test_42"));
  }
}
