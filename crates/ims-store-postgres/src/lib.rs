//! PostgreSQL backend for the IMS incident store.
//!
//! Runs over a bounded [`sqlx::PgPool`]; every store operation checks out one
//! connection for the length of its transaction.

mod encode;
mod queries;
mod schema;
mod store;

pub mod config;
pub mod error;

pub use config::PostgresConfig;
pub use error::{Error, Result};
pub use schema::CURRENT_VERSION;
pub use store::PostgresStore;

#[cfg(test)]
mod tests;
