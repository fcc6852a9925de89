//! Error type for `ims-store-postgres`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] ims_core::Error),

  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),

  #[error("config error: {0}")]
  Config(#[from] config::ConfigError),

  /// The configured schema is not a plain SQL identifier.
  #[error("invalid schema name: {0:?}")]
  InvalidSchemaName(String),

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
