//! Domain model, store interface and edit engine for the IMS incident store.
//!
//! Backends (`ims-store-sqlite`, `ims-store-postgres`) implement
//! [`store::IncidentStore`] and map every [`query::Query`] to their own SQL.
//! Nothing here touches a database.

pub mod edit;
pub mod error;
pub mod event;
pub mod field_report;
pub mod incident;
pub mod location;
pub mod query;
pub mod ranger;
pub mod report_entry;
pub mod schema;
pub mod store;

pub use error::{Error, Result, StorageError};
