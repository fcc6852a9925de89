//! [`SqliteStore`]: the SQLite implementation of [`IncidentStore`].

use std::{
  collections::{BTreeMap, BTreeSet},
  path::Path,
  time::Duration,
};

use ims_core::{
  edit::{
    self, FieldReportDelta, FieldReportEdit, IncidentChange, IncidentDelta,
    IncidentEdit,
  },
  event::{AccessMode, Event},
  field_report::FieldReport,
  incident::{Incident, IncidentState, IncidentType},
  query::{FieldReportColumn, Query},
  report_entry::{ReportEntry, now},
  schema::SchemaState,
  store::IncidentStore,
};
use rusqlite::{
  Connection, OptionalExtension as _, Params, Row, TransactionBehavior,
  params, types::FromSql,
};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  config::SqliteConfig,
  encode::{
    RawFieldReport, RawIncident, RawReportEntry, decode_number, decode_state,
    encode_time, group_entries,
  },
  queries::sql,
  schema::{CONNECTION_PRAGMAS, TableSchema, describe, migrate, schema_state},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An IMS data store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted. Every call
/// runs on the connection's own thread, one at a time, so writes never
/// contend with each other inside one process.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  pub async fn connect(config: &SqliteConfig) -> Result<Self> {
    if config.is_in_memory() {
      Self::open_in_memory().await
    } else {
      Self::open(config.resolved_path()).await
    }
  }

  /// Open (or create) a store at `path` and bring its schema up to date.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::from_connection(conn).await
  }

  /// Open an in-memory store, mostly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::from_connection(conn).await
  }

  pub(crate) async fn from_connection(
    conn: tokio_rusqlite::Connection,
  ) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(CONNECTION_PRAGMAS)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(migrate(conn))
      })
      .await??;
    Ok(Self { conn })
  }

  pub async fn close(self) -> Result<()> {
    self.conn.close().await?;
    Ok(())
  }

  /// The version stamped in `SCHEMA_INFO`.
  pub async fn schema_version(&self) -> Result<u32> {
    self
      .read(|conn| match schema_state(conn)? {
        SchemaState::Version(v) => Ok(v),
        _ => Err(ims_core::StorageError::SchemaMissingVersion.into()),
      })
      .await
  }

  /// Tables, columns and foreign keys as SQLite reports them.
  pub async fn describe_schema(&self) -> Result<Vec<TableSchema>> {
    self.read(describe).await
  }

  /// Run `f` inside a deferred (read) transaction.
  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        Ok(f(&tx))
      })
      .await?
  }

  /// Run `f` inside an immediate (write) transaction, committing only if it
  /// succeeds.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        match f(&tx) {
          Ok(value) => {
            tx.commit()?;
            Ok(Ok(value))
          }
          Err(e) => {
            if matches!(e, Error::Core(_)) {
              debug!(error = %e, "rolling back transaction");
            } else {
              warn!(error = %e, "rolling back transaction");
            }
            Ok(Err(e))
          }
        }
      })
      .await?
  }
}

// ─── Statement helpers ───────────────────────────────────────────────────────

fn execute(conn: &Connection, query: Query, params: impl Params) -> Result<usize> {
  let mut stmt = conn.prepare_cached(sql(query))?;
  Ok(stmt.execute(params)?)
}

fn query_all<T>(
  conn: &Connection,
  query: Query,
  params: impl Params,
  map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
  let mut stmt = conn.prepare_cached(sql(query))?;
  let rows = stmt
    .query_map(params, map)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows)
}

fn query_one<T>(
  conn: &Connection,
  query: Query,
  params: impl Params,
  map: impl FnOnce(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Option<T>> {
  let mut stmt = conn.prepare_cached(sql(query))?;
  Ok(stmt.query_row(params, map).optional()?)
}

/// A statement that always yields exactly one value.
fn query_value<T: FromSql>(
  conn: &Connection,
  query: Query,
  params: impl Params,
) -> Result<T> {
  let mut stmt = conn.prepare_cached(sql(query))?;
  Ok(stmt.query_row(params, |row| row.get(0))?)
}

// ─── Lookups ─────────────────────────────────────────────────────────────────

fn event_id(conn: &Connection, event: &Event) -> Result<Option<i64>> {
  query_one(conn, Query::EventId, [&event.id], |row| row.get(0))
}

fn require_event(conn: &Connection, event: &Event) -> Result<i64> {
  event_id(conn, event)?
    .ok_or_else(|| ims_core::Error::NoSuchEvent(event.id.clone()).into())
}

fn no_such_incident(event: &Event, number: u32) -> Error {
  ims_core::Error::NoSuchIncident {
    event: event.id.clone(),
    number,
  }
  .into()
}

fn no_such_field_report(event: &Event, number: u32) -> Error {
  ims_core::Error::NoSuchFieldReport {
    event: event.id.clone(),
    number,
  }
  .into()
}

/// The event row ID and current state of an existing incident.
fn locate_incident(
  conn: &Connection,
  event: &Event,
  number: u32,
) -> Result<(i64, IncidentState)> {
  let event_id =
    event_id(conn, event)?.ok_or_else(|| no_such_incident(event, number))?;
  let state: String = query_one(
    conn,
    Query::CurrentIncidentState,
    params![event_id, number],
    |row| row.get(0),
  )?
  .ok_or_else(|| no_such_incident(event, number))?;
  Ok((event_id, decode_state(&state)?))
}

/// The event row ID and current attachment of an existing field report.
fn locate_field_report(
  conn: &Connection,
  event: &Event,
  number: u32,
) -> Result<(i64, Option<u32>)> {
  let event_id =
    event_id(conn, event)?.ok_or_else(|| no_such_field_report(event, number))?;
  let attachment: Option<i64> = query_one(
    conn,
    Query::FieldReportAttachment,
    params![event_id, number],
    |row| row.get(0),
  )?
  .ok_or_else(|| no_such_field_report(event, number))?;
  Ok((event_id, attachment.map(decode_number).transpose()?))
}

/// Fails with `InvalidValue` unless `event_id` has a concentric street `id`.
fn require_concentric_street(conn: &Connection, event_id: i64, id: &str) -> Result<()> {
  let streets = query_all(conn, Query::ConcentricStreets, [event_id], |row| {
    row.get::<_, String>(0)
  })?;
  if streets.iter().any(|street| street == id) {
    Ok(())
  } else {
    Err(
      ims_core::Error::InvalidValue(format!("unknown concentric street {id:?}"))
        .into(),
    )
  }
}

fn incident_type_id(conn: &Connection, name: &str) -> Result<i64> {
  query_one(conn, Query::IncidentTypeId, [name], |row| row.get(0))?.ok_or_else(
    || ims_core::Error::InvalidValue(format!("unknown incident type {name:?}")).into(),
  )
}

// ─── Incident reads ──────────────────────────────────────────────────────────

fn read_incidents(
  conn: &Connection,
  event: &Event,
  event_id: i64,
) -> Result<Vec<Incident>> {
  let raws = query_all(conn, Query::Incidents, [event_id], RawIncident::from_row)?;
  let mut entries = group_entries(query_all(
    conn,
    Query::IncidentsReportEntries,
    [event_id],
    RawReportEntry::from_row,
  )?)?;

  raws
    .into_iter()
    .map(|raw| {
      let number = decode_number(raw.number)?;
      raw.into_incident(event, entries.remove(&number).unwrap_or_default())
    })
    .collect()
}

fn read_incident(conn: &Connection, event: &Event, number: u32) -> Result<Incident> {
  let event_id =
    event_id(conn, event)?.ok_or_else(|| no_such_incident(event, number))?;
  let raw = query_one(
    conn,
    Query::Incident,
    params![event_id, number],
    RawIncident::from_row,
  )?
  .ok_or_else(|| no_such_incident(event, number))?;
  let mut entries = group_entries(query_all(
    conn,
    Query::IncidentReportEntries,
    params![event_id, number],
    RawReportEntry::from_row,
  )?)?;
  raw.into_incident(event, entries.remove(&number).unwrap_or_default())
}

// ─── Incident writes ─────────────────────────────────────────────────────────

fn insert_report_entry(conn: &Connection, entry: &ReportEntry) -> Result<i64> {
  query_value(
    conn,
    Query::CreateReportEntry,
    params![
      entry.author,
      entry.text,
      encode_time(entry.created),
      entry.automatic
    ],
  )
}

fn attach_incident_entries(
  conn: &Connection,
  event_id: i64,
  number: u32,
  entries: &[ReportEntry],
) -> Result<()> {
  for entry in entries {
    let entry_id = insert_report_entry(conn, entry)?;
    execute(
      conn,
      Query::AttachReportEntryToIncident,
      params![event_id, number, entry_id],
    )?;
  }
  Ok(())
}

fn replace_ranger_handles(
  conn: &Connection,
  event_id: i64,
  number: u32,
  handles: &BTreeSet<String>,
) -> Result<()> {
  execute(conn, Query::ClearIncidentRangerHandles, params![event_id, number])?;
  for handle in handles {
    execute(
      conn,
      Query::AttachRangerHandleToIncident,
      params![event_id, number, handle],
    )?;
  }
  Ok(())
}

fn replace_incident_types(
  conn: &Connection,
  event_id: i64,
  number: u32,
  types: &BTreeSet<String>,
) -> Result<()> {
  execute(conn, Query::ClearIncidentTypes, params![event_id, number])?;
  for name in types {
    let type_id = incident_type_id(conn, name)?;
    execute(
      conn,
      Query::AttachIncidentTypeToIncident,
      params![event_id, number, type_id],
    )?;
  }
  Ok(())
}

fn insert_incident(conn: &Connection, event_id: i64, incident: &Incident) -> Result<()> {
  let address = &incident.location.address;
  if let Some(concentric) = address.concentric() {
    require_concentric_street(conn, event_id, concentric)?;
  }
  execute(
    conn,
    Query::CreateIncident,
    params![
      event_id,
      incident.number,
      encode_time(incident.created),
      incident.priority.to_stored(),
      incident.state.as_ref(),
      incident.summary,
      incident.location.name,
      address.concentric(),
      address.radial_hour(),
      address.radial_minute(),
      address.description(),
    ],
  )?;
  replace_ranger_handles(conn, event_id, incident.number, &incident.ranger_handles)?;
  replace_incident_types(conn, event_id, incident.number, &incident.incident_types)?;
  attach_incident_entries(conn, event_id, incident.number, &incident.report_entries)
}

fn set_incident_column(
  conn: &Connection,
  event_id: i64,
  number: u32,
  change: &IncidentChange,
) -> Result<()> {
  let query = Query::SetIncidentColumn(change.column());
  match change {
    IncidentChange::Priority(p) => {
      execute(conn, query, params![event_id, number, p.to_stored()])
    }
    IncidentChange::State(s) => {
      execute(conn, query, params![event_id, number, s.as_ref()])
    }
    IncidentChange::LocationConcentric(v) => {
      if let Some(id) = v {
        require_concentric_street(conn, event_id, id)?;
      }
      execute(conn, query, params![event_id, number, v])
    }
    IncidentChange::Summary(v)
    | IncidentChange::LocationName(v)
    | IncidentChange::LocationDescription(v) => {
      execute(conn, query, params![event_id, number, v])
    }
    IncidentChange::LocationRadialHour(v)
    | IncidentChange::LocationRadialMinute(v) => {
      execute(conn, query, params![event_id, number, v])
    }
  }?;
  Ok(())
}

fn apply_incident_delta_in(
  conn: &Connection,
  event: &Event,
  number: u32,
  delta: &IncidentDelta,
) -> Result<()> {
  let (event_id, state) = locate_incident(conn, event, number)?;

  for change in delta.scalar_changes() {
    if let IncidentChange::State(next) = change
      && !state.may_become(*next)
    {
      return Err(
        ims_core::Error::EditNotAllowed(format!(
          "incident #{number} cannot move from {state} to {next}"
        ))
        .into(),
      );
    }
    set_incident_column(conn, event_id, number, change)?;
  }
  if let Some(handles) = delta.new_ranger_handles() {
    replace_ranger_handles(conn, event_id, number, handles)?;
  }
  if let Some(types) = delta.new_incident_types() {
    replace_incident_types(conn, event_id, number, types)?;
  }
  attach_incident_entries(conn, event_id, number, delta.report_entries())?;

  debug!(
    event = %event,
    number,
    changes = delta.scalar_changes().len(),
    entries = delta.report_entries().len(),
    "applied incident delta"
  );
  Ok(())
}

// ─── Field reports ───────────────────────────────────────────────────────────

fn assemble_field_reports(
  conn: &Connection,
  event: &Event,
  event_id: i64,
  raws: Vec<RawFieldReport>,
) -> Result<Vec<FieldReport>> {
  let mut entries = group_entries(query_all(
    conn,
    Query::FieldReportsReportEntries,
    [event_id],
    RawReportEntry::from_row,
  )?)?;
  raws
    .into_iter()
    .map(|raw| {
      let number = decode_number(raw.number)?;
      raw.into_field_report(event, entries.remove(&number).unwrap_or_default())
    })
    .collect()
}

fn read_field_report(
  conn: &Connection,
  event: &Event,
  number: u32,
) -> Result<FieldReport> {
  let event_id =
    event_id(conn, event)?.ok_or_else(|| no_such_field_report(event, number))?;
  let raw = query_one(
    conn,
    Query::FieldReport,
    params![event_id, number],
    RawFieldReport::from_row,
  )?
  .ok_or_else(|| no_such_field_report(event, number))?;
  let mut entries = group_entries(query_all(
    conn,
    Query::FieldReportReportEntries,
    params![event_id, number],
    RawReportEntry::from_row,
  )?)?;
  raw.into_field_report(event, entries.remove(&number).unwrap_or_default())
}

fn attach_field_report_entries(
  conn: &Connection,
  event_id: i64,
  number: u32,
  entries: &[ReportEntry],
) -> Result<()> {
  for entry in entries {
    let entry_id = insert_report_entry(conn, entry)?;
    execute(
      conn,
      Query::AttachReportEntryToFieldReport,
      params![event_id, number, entry_id],
    )?;
  }
  Ok(())
}

fn insert_field_report(
  conn: &Connection,
  event_id: i64,
  report: &FieldReport,
) -> Result<()> {
  if let Some(incident_number) = report.incident_number {
    locate_incident(conn, &report.event, incident_number)?;
  }
  execute(
    conn,
    Query::CreateFieldReport,
    params![
      event_id,
      report.number,
      encode_time(report.created),
      report.summary,
      report.incident_number,
    ],
  )?;
  attach_field_report_entries(conn, event_id, report.number, &report.report_entries)
}

fn apply_field_report_delta_in(
  conn: &Connection,
  event: &Event,
  number: u32,
  delta: &FieldReportDelta,
) -> Result<()> {
  let (event_id, _) = locate_field_report(conn, event, number)?;
  if let Some(summary) = delta.new_summary() {
    execute(
      conn,
      Query::SetFieldReportColumn(FieldReportColumn::Summary),
      params![event_id, number, summary],
    )?;
  }
  attach_field_report_entries(conn, event_id, number, delta.report_entries())?;
  debug!(event = %event, number, "applied field report delta");
  Ok(())
}

/// Point a field report at `incident_number` (or at nothing) and record the
/// change on the report.
fn set_attachment(
  conn: &Connection,
  event_id: i64,
  number: u32,
  incident_number: Option<u32>,
  entry: ReportEntry,
) -> Result<()> {
  execute(
    conn,
    Query::SetFieldReportColumn(FieldReportColumn::IncidentNumber),
    params![event_id, number, incident_number],
  )?;
  attach_field_report_entries(conn, event_id, number, &[entry])
}

// ─── IncidentStore impl ──────────────────────────────────────────────────────

impl IncidentStore for SqliteStore {
  // ── Events ────────────────────────────────────────────────────────────────

  async fn events(&self) -> ims_core::Result<Vec<Event>> {
    let names = self
      .read(|conn| query_all(conn, Query::Events, [], |row| row.get::<_, String>(0)))
      .await?;
    Ok(names.into_iter().map(Event::new).collect())
  }

  async fn create_event(&self, event: &Event) -> ims_core::Result<()> {
    let name = event.id.clone();
    self
      .write(move |conn| execute(conn, Query::CreateEvent, [&name]))
      .await?;
    info!(event = %event, "created event");
    Ok(())
  }

  async fn access(
    &self,
    event: &Event,
    mode: AccessMode,
  ) -> ims_core::Result<Vec<String>> {
    let event = event.clone();
    Ok(
      self
        .read(move |conn| {
          let Some(event_id) = event_id(conn, &event)? else {
            return Ok(Vec::new());
          };
          query_all(
            conn,
            Query::EventAccess,
            params![event_id, mode.as_ref()],
            |row| row.get(0),
          )
        })
        .await?,
    )
  }

  async fn set_access(
    &self,
    event: &Event,
    mode: AccessMode,
    expressions: Vec<String>,
  ) -> ims_core::Result<()> {
    let event = event.clone();
    let expressions: BTreeSet<String> = expressions.into_iter().collect();
    Ok(
      self
        .write(move |conn| {
          let event_id = require_event(conn, &event)?;
          execute(conn, Query::ClearEventAccess, params![event_id, mode.as_ref()])?;
          for expression in &expressions {
            execute(
              conn,
              Query::AddEventAccess,
              params![event_id, expression, mode.as_ref()],
            )?;
          }
          Ok(())
        })
        .await?,
    )
  }

  // ── Incident types ────────────────────────────────────────────────────────

  async fn incident_types(
    &self,
    include_hidden: bool,
  ) -> ims_core::Result<Vec<IncidentType>> {
    let query = if include_hidden {
      Query::IncidentTypes
    } else {
      Query::VisibleIncidentTypes
    };
    Ok(
      self
        .read(move |conn| {
          query_all(conn, query, [], |row| {
            Ok(IncidentType {
              name:   row.get(0)?,
              hidden: row.get(1)?,
            })
          })
        })
        .await?,
    )
  }

  async fn create_incident_type(&self, name: &str, hidden: bool) -> ims_core::Result<()> {
    let name = name.to_owned();
    self
      .write(move |conn| execute(conn, Query::CreateIncidentType, params![name, hidden]))
      .await?;
    Ok(())
  }

  async fn set_incident_types_hidden(
    &self,
    names: &[String],
    hidden: bool,
  ) -> ims_core::Result<()> {
    let names = names.to_vec();
    Ok(
      self
        .write(move |conn| {
          for name in &names {
            let updated =
              execute(conn, Query::SetIncidentTypeHidden, params![name, hidden])?;
            if updated == 0 {
              return Err(
                ims_core::Error::InvalidValue(format!("unknown incident type {name:?}"))
                  .into(),
              );
            }
          }
          Ok(())
        })
        .await?,
    )
  }

  // ── Concentric streets ────────────────────────────────────────────────────

  async fn concentric_streets(
    &self,
    event: &Event,
  ) -> ims_core::Result<BTreeMap<String, String>> {
    let event = event.clone();
    Ok(
      self
        .read(move |conn| {
          let Some(event_id) = event_id(conn, &event)? else {
            return Ok(BTreeMap::new());
          };
          let streets = query_all(conn, Query::ConcentricStreets, [event_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
          })?;
          Ok(streets.into_iter().collect())
        })
        .await?,
    )
  }

  async fn create_concentric_street(
    &self,
    event: &Event,
    id: &str,
    name: &str,
  ) -> ims_core::Result<()> {
    let (event, id, name) = (event.clone(), id.to_owned(), name.to_owned());
    Ok(
      self
        .write(move |conn| {
          let event_id = require_event(conn, &event)?;
          execute(
            conn,
            Query::CreateConcentricStreet,
            params![event_id, id, name],
          )?;
          Ok(())
        })
        .await?,
    )
  }

  // ── Incidents ─────────────────────────────────────────────────────────────

  async fn incidents(&self, event: &Event) -> ims_core::Result<Vec<Incident>> {
    let event = event.clone();
    Ok(
      self
        .read(move |conn| match event_id(conn, &event)? {
          Some(event_id) => read_incidents(conn, &event, event_id),
          None => Ok(Vec::new()),
        })
        .await?,
    )
  }

  async fn incident_with_number(
    &self,
    event: &Event,
    number: u32,
  ) -> ims_core::Result<Incident> {
    let event = event.clone();
    Ok(
      self
        .read(move |conn| read_incident(conn, &event, number))
        .await?,
    )
  }

  async fn create_incident(
    &self,
    incident: Incident,
    author: &str,
  ) -> ims_core::Result<Incident> {
    let mut incident = edit::prepare_new_incident(incident, author, now())?;
    let created = self
      .write(move |conn| {
        let event_id = require_event(conn, &incident.event)?;
        let next: i64 = query_value(conn, Query::NextIncidentNumber, [event_id])?;
        incident.number = decode_number(next)?;
        insert_incident(conn, event_id, &incident)?;
        read_incident(conn, &incident.event, incident.number)
      })
      .await?;
    debug!(event = %created.event, number = created.number, "created incident");
    Ok(created)
  }

  async fn import_incident(&self, incident: Incident) -> ims_core::Result<Incident> {
    if incident.number == 0 {
      return Err(ims_core::Error::InvalidValue(
        "imported incident must carry its number".into(),
      ));
    }
    let imported = self
      .write(move |conn| {
        let event_id = require_event(conn, &incident.event)?;
        insert_incident(conn, event_id, &incident)?;
        read_incident(conn, &incident.event, incident.number)
      })
      .await?;
    debug!(event = %imported.event, number = imported.number, "imported incident");
    Ok(imported)
  }

  async fn apply_incident_delta(
    &self,
    event: &Event,
    number: u32,
    delta: IncidentDelta,
  ) -> ims_core::Result<()> {
    let event = event.clone();
    self
      .write(move |conn| apply_incident_delta_in(conn, &event, number, &delta))
      .await?;
    Ok(())
  }

  async fn edit_incident(
    &self,
    event: &Event,
    number: u32,
    edit: IncidentEdit,
    author: &str,
  ) -> ims_core::Result<Incident> {
    let (event, author) = (event.clone(), author.to_owned());
    Ok(
      self
        .write(move |conn| {
          let before = read_incident(conn, &event, number)?;
          let delta = edit::diff_incident(&before, &edit, &author, now())?;
          if delta.is_empty() {
            return Ok(before);
          }
          apply_incident_delta_in(conn, &event, number, &delta)?;
          read_incident(conn, &event, number)
        })
        .await?,
    )
  }

  // ── Field reports ─────────────────────────────────────────────────────────

  async fn field_reports(&self, event: &Event) -> ims_core::Result<Vec<FieldReport>> {
    let event = event.clone();
    Ok(
      self
        .read(move |conn| {
          let Some(event_id) = event_id(conn, &event)? else {
            return Ok(Vec::new());
          };
          let raws =
            query_all(conn, Query::FieldReports, [event_id], RawFieldReport::from_row)?;
          assemble_field_reports(conn, &event, event_id, raws)
        })
        .await?,
    )
  }

  async fn field_report_with_number(
    &self,
    event: &Event,
    number: u32,
  ) -> ims_core::Result<FieldReport> {
    let event = event.clone();
    Ok(
      self
        .read(move |conn| read_field_report(conn, &event, number))
        .await?,
    )
  }

  async fn create_field_report(
    &self,
    report: FieldReport,
    author: &str,
  ) -> ims_core::Result<FieldReport> {
    let mut report = edit::prepare_new_field_report(report, author, now())?;
    let created = self
      .write(move |conn| {
        let event_id = require_event(conn, &report.event)?;
        let next: i64 = query_value(conn, Query::NextFieldReportNumber, [])?;
        report.number = decode_number(next)?;
        insert_field_report(conn, event_id, &report)?;
        read_field_report(conn, &report.event, report.number)
      })
      .await?;
    debug!(event = %created.event, number = created.number, "created field report");
    Ok(created)
  }

  async fn import_field_report(
    &self,
    report: FieldReport,
  ) -> ims_core::Result<FieldReport> {
    if report.number == 0 {
      return Err(ims_core::Error::InvalidValue(
        "imported field report must carry its number".into(),
      ));
    }
    Ok(
      self
        .write(move |conn| {
          let event_id = require_event(conn, &report.event)?;
          insert_field_report(conn, event_id, &report)?;
          read_field_report(conn, &report.event, report.number)
        })
        .await?,
    )
  }

  async fn apply_field_report_delta(
    &self,
    event: &Event,
    number: u32,
    delta: FieldReportDelta,
  ) -> ims_core::Result<()> {
    let event = event.clone();
    self
      .write(move |conn| apply_field_report_delta_in(conn, &event, number, &delta))
      .await?;
    Ok(())
  }

  async fn edit_field_report(
    &self,
    event: &Event,
    number: u32,
    edit: FieldReportEdit,
    author: &str,
  ) -> ims_core::Result<FieldReport> {
    let (event, author) = (event.clone(), author.to_owned());
    Ok(
      self
        .write(move |conn| {
          let before = read_field_report(conn, &event, number)?;
          let delta = edit::diff_field_report(&before, &edit, &author, now())?;
          if delta.is_empty() {
            return Ok(before);
          }
          apply_field_report_delta_in(conn, &event, number, &delta)?;
          read_field_report(conn, &event, number)
        })
        .await?,
    )
  }

  // ── Attachment ────────────────────────────────────────────────────────────

  async fn attach_field_report_to_incident(
    &self,
    field_report_number: u32,
    event: &Event,
    incident_number: u32,
    author: &str,
  ) -> ims_core::Result<FieldReport> {
    let (event, author, at) = (event.clone(), author.to_owned(), now());
    Ok(
      self
        .write(move |conn| {
          let (event_id, current) =
            locate_field_report(conn, &event, field_report_number)?;
          locate_incident(conn, &event, incident_number)?;
          if current != Some(incident_number) {
            set_attachment(
              conn,
              event_id,
              field_report_number,
              Some(incident_number),
              edit::attachment_entry(incident_number, true, &author, at),
            )?;
          }
          read_field_report(conn, &event, field_report_number)
        })
        .await?,
    )
  }

  async fn detach_field_report_from_incident(
    &self,
    field_report_number: u32,
    event: &Event,
    incident_number: u32,
    author: &str,
  ) -> ims_core::Result<FieldReport> {
    let (event, author, at) = (event.clone(), author.to_owned(), now());
    Ok(
      self
        .write(move |conn| {
          let (event_id, current) =
            locate_field_report(conn, &event, field_report_number)?;
          if current == Some(incident_number) {
            set_attachment(
              conn,
              event_id,
              field_report_number,
              None,
              edit::attachment_entry(incident_number, false, &author, at),
            )?;
          }
          read_field_report(conn, &event, field_report_number)
        })
        .await?,
    )
  }

  async fn field_reports_attached_to_incident(
    &self,
    event: &Event,
    incident_number: u32,
  ) -> ims_core::Result<Vec<FieldReport>> {
    let event = event.clone();
    Ok(
      self
        .read(move |conn| {
          let Some(event_id) = event_id(conn, &event)? else {
            return Ok(Vec::new());
          };
          let raws = query_all(
            conn,
            Query::FieldReportsAttachedToIncident,
            params![event_id, incident_number],
            RawFieldReport::from_row,
          )?;
          assemble_field_reports(conn, &event, event_id, raws)
        })
        .await?,
    )
  }

  async fn detached_field_reports(
    &self,
    event: &Event,
  ) -> ims_core::Result<Vec<FieldReport>> {
    let event = event.clone();
    Ok(
      self
        .read(move |conn| {
          let Some(event_id) = event_id(conn, &event)? else {
            return Ok(Vec::new());
          };
          let raws = query_all(
            conn,
            Query::DetachedFieldReports,
            [event_id],
            RawFieldReport::from_row,
          )?;
          assemble_field_reports(conn, &event, event_id, raws)
        })
        .await?,
    )
  }
}

