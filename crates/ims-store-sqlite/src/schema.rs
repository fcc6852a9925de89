//! SQL schema for the IMS SQLite store, and the driver that brings an
//! existing database up to the current version.
//!
//! Upgrades run with foreign key enforcement suspended, because SQLite can
//! only change a column's type by rebuilding its table. Each step runs in
//! its own transaction and is checked with `foreign_key_check` before it
//! commits.

use ims_core::{
  StorageError,
  error::BoxError,
  query::Query,
  schema::{MigrationPlan, SchemaScripts, SchemaState, Step},
};
use rusqlite::{Connection, OptionalExtension as _};
use tracing::{debug, info};

use crate::{Error, Result, queries::sql};

pub const CURRENT_VERSION: u32 = 4;

pub(crate) const SCRIPTS: SchemaScripts = SchemaScripts {
  current:  CURRENT_VERSION,
  create:   include_str!("schema/schema.4.sql"),
  upgrades: &[
    (2, include_str!("schema/schema.2-from-1.sql")),
    (3, include_str!("schema/schema.3-from-2.sql")),
    (4, include_str!("schema/schema.4-from-3.sql")),
  ],
};

/// The first schema generation, for exercising the upgrade path.
#[cfg(test)]
pub(crate) const SCHEMA_1: &str = include_str!("schema/schema.1.sql");

/// Applied to every connection before the schema is touched.
pub(crate) const CONNECTION_PRAGMAS: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
";

pub(crate) fn schema_state(conn: &Connection) -> Result<SchemaState> {
  let tables: i64 = conn.query_row(
    "select count(*) from sqlite_master
     where type = 'table' and name = 'SCHEMA_INFO'",
    [],
    |row| row.get(0),
  )?;
  if tables == 0 {
    return Ok(SchemaState::Missing);
  }

  let version: Option<i64> = conn
    .query_row(sql(Query::SchemaVersion), [], |row| row.get(0))
    .optional()?;
  match version {
    None => Ok(SchemaState::Empty),
    Some(v) => u32::try_from(v)
      .map(SchemaState::Version)
      .map_err(|_| Error::decode(format!("schema version {v}"))),
  }
}

/// Create or upgrade the schema so it matches [`CURRENT_VERSION`].
pub(crate) fn migrate(conn: &mut Connection) -> Result<()> {
  match SCRIPTS.plan(schema_state(conn)?)? {
    MigrationPlan::UpToDate => {
      debug!(version = CURRENT_VERSION, "schema is current");
      Ok(())
    }
    MigrationPlan::Create => {
      info!(version = CURRENT_VERSION, "creating schema");
      let tx = conn.transaction()?;
      tx.execute_batch(SCRIPTS.create)?;
      tx.commit()?;
      Ok(())
    }
    MigrationPlan::Upgrade(steps) => {
      conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
      let upgraded = steps.iter().try_for_each(|step| run_step(conn, step));
      conn.execute_batch("PRAGMA foreign_keys = ON;")?;
      upgraded
    }
  }
}

fn run_step(conn: &mut Connection, step: &Step) -> Result<()> {
  info!(from = step.from, to = step.to, "upgrading schema");

  let failed = |source: BoxError| -> Error {
    StorageError::Migration {
      from: step.from,
      to: step.to,
      source,
    }
    .into()
  };

  let tx = conn.transaction().map_err(|e| failed(e.into()))?;
  tx.execute_batch(step.script).map_err(|e| failed(e.into()))?;

  let version: i64 = tx
    .query_row(sql(Query::SchemaVersion), [], |row| row.get(0))
    .map_err(|e| failed(e.into()))?;
  if version != i64::from(step.to) {
    return Err(failed(
      format!("script left SCHEMA_INFO at version {version}").into(),
    ));
  }

  let violations: i64 = tx
    .query_row("select count(*) from pragma_foreign_key_check", [], |row| {
      row.get(0)
    })
    .map_err(|e| failed(e.into()))?;
  if violations > 0 {
    return Err(failed(
      format!("{violations} rows violate foreign key constraints").into(),
    ));
  }

  tx.commit().map_err(|e| failed(e.into()))
}

// ─── Diagnostics ─────────────────────────────────────────────────────────────

/// One table as SQLite reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
  pub name:         String,
  pub columns:      Vec<ColumnSchema>,
  pub foreign_keys: Vec<ForeignKeySchema>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
  pub name:          String,
  pub declared_type: String,
  pub not_null:      bool,
  pub default:       Option<String>,
  /// Position within the primary key, `0` if not part of it.
  pub primary_key:   i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySchema {
  pub id:     i64,
  pub table:  String,
  pub from:   String,
  pub to:     Option<String>,
}

pub(crate) fn describe(conn: &Connection) -> Result<Vec<TableSchema>> {
  let mut tables = conn.prepare(
    "select name from sqlite_master
     where type = 'table' and name not like 'sqlite_%'
     order by name",
  )?;
  let names = tables
    .query_map([], |row| row.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut columns = conn.prepare(
    "select name, type, \"notnull\", dflt_value, pk
     from pragma_table_info(?1)
     order by cid",
  )?;
  let mut foreign_keys = conn.prepare(
    "select id, \"table\", \"from\", \"to\"
     from pragma_foreign_key_list(?1)
     order by id, seq",
  )?;

  names
    .into_iter()
    .map(|name| {
      let columns = columns
        .query_map([&name], |row| {
          Ok(ColumnSchema {
            name:          row.get(0)?,
            declared_type: row.get(1)?,
            not_null:      row.get(2)?,
            default:       row.get(3)?,
            primary_key:   row.get(4)?,
          })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      let foreign_keys = foreign_keys
        .query_map([&name], |row| {
          Ok(ForeignKeySchema {
            id:    row.get(0)?,
            table: row.get(1)?,
            from:  row.get(2)?,
            to:    row.get(3)?,
          })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
      Ok(TableSchema {
        name,
        columns,
        foreign_keys,
      })
    })
    .collect()
}
