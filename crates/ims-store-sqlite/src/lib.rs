//! Embedded SQLite backend for the IMS incident store.
//!
//! One database file, one [`tokio_rusqlite`] connection thread. Opening a
//! store creates or upgrades its schema before the first query runs.

mod encode;
mod queries;
mod schema;
mod store;

pub mod config;
pub mod error;

pub use config::SqliteConfig;
pub use error::{Error, Result};
pub use schema::{CURRENT_VERSION, ColumnSchema, ForeignKeySchema, TableSchema};
pub use store::SqliteStore;
