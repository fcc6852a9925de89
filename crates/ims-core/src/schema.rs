//! Schema versioning shared by every SQL store.
//!
//! A backend describes its DDL with [`SchemaScripts`]; the planner decides
//! from the stored version what has to run. Executing the plan is the
//! backend's job, one transaction per step.

use crate::{Result, error::StorageError};

/// What a store found when it looked for `SCHEMA_INFO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaState {
  /// No `SCHEMA_INFO` table: a fresh database.
  Missing,
  /// The table exists but holds no version row.
  Empty,
  Version(u32),
}

/// One upgrade script, taking the schema from `to - 1` to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
  pub from:   u32,
  pub to:     u32,
  pub script: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationPlan {
  /// Run the create script for the current version.
  Create,
  UpToDate,
  /// Run these steps in order.
  Upgrade(Vec<Step>),
}

/// The DDL one backend ships.
#[derive(Debug, Clone, Copy)]
pub struct SchemaScripts {
  pub current:  u32,
  /// Creates the current schema and stamps its version.
  pub create:   &'static str,
  /// `(to, script)` pairs; each script upgrades from `to - 1`.
  pub upgrades: &'static [(u32, &'static str)],
}

impl SchemaScripts {
  pub fn upgrade_script(&self, to: u32) -> Option<&'static str> {
    self
      .upgrades
      .iter()
      .find_map(|(version, script)| (*version == to).then_some(*script))
  }

  /// Decide what to run against a store in `state`.
  ///
  /// Every step is resolved before anything runs, so a gap in the scripts
  /// fails the plan rather than a half-finished upgrade.
  pub fn plan(&self, state: SchemaState) -> Result<MigrationPlan> {
    let found = match state {
      SchemaState::Missing => return Ok(MigrationPlan::Create),
      SchemaState::Empty => return Err(StorageError::SchemaMissingVersion.into()),
      SchemaState::Version(found) => found,
    };

    if found == self.current {
      return Ok(MigrationPlan::UpToDate);
    }
    if found > self.current {
      return Err(
        StorageError::SchemaTooNew {
          found,
          current: self.current,
        }
        .into(),
      );
    }

    (found + 1..=self.current)
      .map(|to| {
        let script = self.upgrade_script(to).ok_or_else(|| StorageError::Migration {
          from:   to - 1,
          to,
          source: format!("no upgrade script to version {to}").into(),
        })?;
        Ok(Step {
          from: to - 1,
          to,
          script,
        })
      })
      .collect::<Result<Vec<_>>>()
      .map(MigrationPlan::Upgrade)
  }
}
