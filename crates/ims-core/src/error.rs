//! Error types for `ims-core`.
//!
//! Every store operation fails with one of these kinds regardless of the
//! backend that served it.

use thiserror::Error;

/// Boxed driver or codec error carried by [`StorageError::Engine`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("storage error: {0}")]
  Storage(#[from] StorageError),

  #[error("no such event: {0:?}")]
  NoSuchEvent(String),

  #[error("no incident #{number} in event {event:?}")]
  NoSuchIncident { event: String, number: u32 },

  #[error("no field report #{number} in event {event:?}")]
  NoSuchFieldReport { event: String, number: u32 },

  #[error("edit not allowed: {0}")]
  EditNotAllowed(String),

  #[error("invalid value: {0}")]
  InvalidValue(String),
}

impl Error {
  /// Wrap any underlying engine failure as a storage error.
  pub fn storage(source: impl Into<BoxError>) -> Self {
    Self::Storage(StorageError::Engine(source.into()))
  }

  pub fn is_storage(&self) -> bool { matches!(self, Self::Storage(_)) }
}

/// The base storage kind: engine failures, schema corruption and migration
/// failures.
#[derive(Debug, Error)]
pub enum StorageError {
  #[error(transparent)]
  Engine(BoxError),

  /// `SCHEMA_INFO` exists but holds no version row.
  #[error("schema is corrupt: no version recorded in SCHEMA_INFO")]
  SchemaMissingVersion,

  #[error(
    "schema version {found} is newer than this software supports ({current})"
  )]
  SchemaTooNew { found: u32, current: u32 },

  #[error("schema upgrade from version {from} to {to} failed: {source}")]
  Migration {
    from:   u32,
    to:     u32,
    #[source]
    source: BoxError,
  },

  /// A persisted value could not be mapped back into the domain model.
  #[error("cannot decode stored value: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
