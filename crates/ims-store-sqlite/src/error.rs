//! Error type for `ims-store-sqlite`.
//!
//! Driver and codec failures stay in this enum until they cross the
//! [`IncidentStore`](ims_core::store::IncidentStore) boundary, where they
//! become [`ims_core::StorageError`]. Domain errors raised inside a
//! transaction travel as [`Error::Core`] and come out unchanged.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] ims_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("config error: {0}")]
  Config(#[from] config::ConfigError),

  /// A stored value has no domain representation.
  #[error("cannot decode stored value: {0}")]
  Decode(String),
}

impl Error {
  pub(crate) fn decode(what: impl Into<String>) -> Self {
    Self::Decode(what.into())
  }
}

impl From<ims_core::StorageError> for Error {
  fn from(e: ims_core::StorageError) -> Self { Self::Core(e.into()) }
}

impl From<Error> for ims_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(core) => core,
      Error::Decode(what) => ims_core::StorageError::Decode(what).into(),
      other => ims_core::Error::storage(other),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
