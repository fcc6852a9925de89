//! SQL schema for the IMS PostgreSQL store and its upgrade driver.
//!
//! DDL is transactional here, so each upgrade step runs and verifies inside
//! one transaction and leaves nothing behind if it fails.

use ims_core::{
  StorageError,
  error::BoxError,
  query::Query,
  schema::{MigrationPlan, SchemaScripts, SchemaState, Step},
};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info};

use crate::{Error, Result, queries::sql};

pub const CURRENT_VERSION: u32 = 3;

pub(crate) const SCRIPTS: SchemaScripts = SchemaScripts {
  current:  CURRENT_VERSION,
  create:   include_str!("schema/schema.3.sql"),
  upgrades: &[
    (2, include_str!("schema/schema.2-from-1.sql")),
    (3, include_str!("schema/schema.3-from-2.sql")),
  ],
};

#[cfg(test)]
pub(crate) const SCHEMA_1: &str = include_str!("schema/schema.1.sql");

pub(crate) async fn schema_state(conn: &mut PgConnection) -> Result<SchemaState> {
  let exists: bool =
    sqlx::query_scalar("select to_regclass('schema_info') is not null")
      .fetch_one(&mut *conn)
      .await?;
  if !exists {
    return Ok(SchemaState::Missing);
  }

  let version: Option<i16> = sqlx::query_scalar(sql(Query::SchemaVersion))
    .fetch_optional(&mut *conn)
    .await?;
  match version {
    None => Ok(SchemaState::Empty),
    Some(v) => u32::try_from(v)
      .map(SchemaState::Version)
      .map_err(|_| Error::decode(format!("schema version {v}"))),
  }
}

/// Create or upgrade the schema so it matches [`CURRENT_VERSION`].
pub(crate) async fn migrate(pool: &PgPool) -> Result<()> {
  let state = {
    let mut conn = pool.acquire().await?;
    schema_state(&mut conn).await?
  };

  match SCRIPTS.plan(state)? {
    MigrationPlan::UpToDate => {
      debug!(version = CURRENT_VERSION, "schema is current");
    }
    MigrationPlan::Create => {
      info!(version = CURRENT_VERSION, "creating schema");
      let mut tx = pool.begin().await?;
      sqlx::raw_sql(SCRIPTS.create).execute(&mut *tx).await?;
      tx.commit().await?;
    }
    MigrationPlan::Upgrade(steps) => {
      for step in &steps {
        run_step(pool, step).await?;
      }
    }
  }
  Ok(())
}

async fn run_step(pool: &PgPool, step: &Step) -> Result<()> {
  info!(from = step.from, to = step.to, "upgrading schema");

  let failed = |source: BoxError| -> Error {
    StorageError::Migration {
      from: step.from,
      to: step.to,
      source,
    }
    .into()
  };

  let mut tx = pool.begin().await.map_err(|e| failed(e.into()))?;
  sqlx::raw_sql(step.script)
    .execute(&mut *tx)
    .await
    .map_err(|e| failed(e.into()))?;

  let version: i16 = sqlx::query_scalar(sql(Query::SchemaVersion))
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| failed(e.into()))?;
  if i64::from(version) != i64::from(step.to) {
    return Err(failed(
      format!("script left SCHEMA_INFO at version {version}").into(),
    ));
  }

  tx.commit().await.map_err(|e| failed(e.into()))
}
