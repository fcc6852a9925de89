//! [`PostgresStore`]: the PostgreSQL implementation of [`IncidentStore`].

use std::collections::{BTreeMap, BTreeSet};

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
use sqlx::{PgConnection, PgPool, Postgres, Transaction, postgres::PgPoolOptions};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  config::PostgresConfig,
  encode::{
    RawFieldReport, RawIncident, RawReportEntry, decode_number, decode_state,
    encode_number, encode_radial, group_entries,
  },
  queries::{LOCK_EVENT, LOCK_FIELD_REPORTS, sql},
  schema::{migrate, schema_state},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An IMS data store backed by a PostgreSQL database.
///
/// Cloning shares the pool. Each operation runs in its own transaction on
/// one pooled connection; numbering is serialized with a row lock on the
/// event and an advisory lock for field reports.
#[derive(Clone)]
pub struct PostgresStore {
  pool: PgPool,
}

impl PostgresStore {
  /// Open a pool to the configured server and bring its schema up to date.
  pub async fn connect(config: &PostgresConfig) -> Result<Self> {
    let search_path = config.search_path()?.map(str::to_owned);
    let pool = PgPoolOptions::new()
      .max_connections(config.max_connections)
      .acquire_timeout(config.acquire_timeout())
      .after_connect(move |conn, _meta| {
        let search_path = search_path.clone();
        Box::pin(async move {
          if let Some(schema) = search_path {
            let statement = format!("set search_path to {schema}");
            sqlx::Executor::execute(conn, statement.as_str()).await?;
          }
          Ok(())
        })
      })
      .connect(&config.url)
      .await?;
    Self::from_pool(pool).await
  }

  /// Wrap an existing pool, migrating its schema first.
  pub async fn from_pool(pool: PgPool) -> Result<Self> {
    migrate(&pool).await?;
    Ok(Self { pool })
  }

  pub async fn close(self) -> Result<()> {
    self.pool.close().await;
    Ok(())
  }

  /// The version stamped in `SCHEMA_INFO`.
  pub async fn schema_version(&self) -> Result<u32> {
    let mut conn = self.pool.acquire().await?;
    match schema_state(&mut conn).await? {
      SchemaState::Version(v) => Ok(v),
      _ => Err(ims_core::StorageError::SchemaMissingVersion.into()),
    }
  }

  async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
    Ok(self.pool.begin().await?)
  }
}

/// Commit `tx` if `result` succeeded, roll it back otherwise.
async fn finish<T>(tx: Transaction<'_, Postgres>, result: Result<T>) -> Result<T> {
  match result {
    Ok(value) => {
      tx.commit().await?;
      Ok(value)
    }
    Err(e) => {
      if matches!(e, Error::Core(_)) {
        debug!(error = %e, "rolling back transaction");
      } else {
        warn!(error = %e, "rolling back transaction");
      }
      if let Err(rollback) = tx.rollback().await {
        warn!(error = %rollback, "rollback failed");
      }
      Err(e)
    }
  }
}

// ─── Lookups ─────────────────────────────────────────────────────────────────

async fn event_id(conn: &mut PgConnection, event: &Event) -> Result<Option<i64>> {
  Ok(
    sqlx::query_scalar(sql(Query::EventId))
      .bind(&event.id)
      .fetch_optional(&mut *conn)
      .await?,
  )
}

async fn require_event(conn: &mut PgConnection, event: &Event) -> Result<i64> {
  event_id(conn, event)
    .await?
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

/// The event row ID and current state of an existing incident, locking the
/// incident row until the transaction ends.
async fn locate_incident(
  conn: &mut PgConnection,
  event: &Event,
  number: u32,
) -> Result<(i64, IncidentState)> {
  let event_id = event_id(conn, event)
    .await?
    .ok_or_else(|| no_such_incident(event, number))?;
  let state: String = sqlx::query_scalar(sql(Query::CurrentIncidentState))
    .bind(event_id)
    .bind(encode_number(number))
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| no_such_incident(event, number))?;
  Ok((event_id, decode_state(&state)?))
}

/// The event row ID and current attachment of an existing field report,
/// locking the report row until the transaction ends.
async fn locate_field_report(
  conn: &mut PgConnection,
  event: &Event,
  number: u32,
) -> Result<(i64, Option<u32>)> {
  let event_id = event_id(conn, event)
    .await?
    .ok_or_else(|| no_such_field_report(event, number))?;
  let attachment: Option<i64> = sqlx::query_scalar(sql(Query::FieldReportAttachment))
    .bind(event_id)
    .bind(encode_number(number))
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| no_such_field_report(event, number))?;
  Ok((event_id, attachment.map(decode_number).transpose()?))
}

/// Fails with `InvalidValue` unless `event_id` has a concentric street `id`.
async fn require_concentric_street(
  conn: &mut PgConnection,
  event_id: i64,
  id: &str,
) -> Result<()> {
  let streets: Vec<(String, String)> = sqlx::query_as(sql(Query::ConcentricStreets))
    .bind(event_id)
    .fetch_all(&mut *conn)
    .await?;
  if streets.iter().any(|(street, _)| street == id) {
    Ok(())
  } else {
    Err(
      ims_core::Error::InvalidValue(format!("unknown concentric street {id:?}"))
        .into(),
    )
  }
}

async fn incident_type_id(conn: &mut PgConnection, name: &str) -> Result<i64> {
  sqlx::query_scalar(sql(Query::IncidentTypeId))
    .bind(name)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| {
      ims_core::Error::InvalidValue(format!("unknown incident type {name:?}")).into()
    })
}

// ─── Events ──────────────────────────────────────────────────────────────────

async fn read_access(
  conn: &mut PgConnection,
  event: &Event,
  mode: AccessMode,
) -> Result<Vec<String>> {
  let Some(event_id) = event_id(conn, event).await? else {
    return Ok(Vec::new());
  };
  Ok(
    sqlx::query_scalar(sql(Query::EventAccess))
      .bind(event_id)
      .bind(mode.as_ref())
      .fetch_all(&mut *conn)
      .await?,
  )
}

async fn replace_access(
  conn: &mut PgConnection,
  event: &Event,
  mode: AccessMode,
  expressions: &BTreeSet<String>,
) -> Result<()> {
  let event_id = require_event(conn, event).await?;
  sqlx::query(sql(Query::ClearEventAccess))
    .bind(event_id)
    .bind(mode.as_ref())
    .execute(&mut *conn)
    .await?;
  for expression in expressions {
    sqlx::query(sql(Query::AddEventAccess))
      .bind(event_id)
      .bind(expression)
      .bind(mode.as_ref())
      .execute(&mut *conn)
      .await?;
  }
  Ok(())
}

async fn hide_or_show_types(
  conn: &mut PgConnection,
  names: &[String],
  hidden: bool,
) -> Result<()> {
  for name in names {
    let updated = sqlx::query(sql(Query::SetIncidentTypeHidden))
      .bind(name)
      .bind(hidden)
      .execute(&mut *conn)
      .await?
      .rows_affected();
    if updated == 0 {
      return Err(
        ims_core::Error::InvalidValue(format!("unknown incident type {name:?}")).into(),
      );
    }
  }
  Ok(())
}

async fn read_streets(
  conn: &mut PgConnection,
  event: &Event,
) -> Result<BTreeMap<String, String>> {
  let Some(event_id) = event_id(conn, event).await? else {
    return Ok(BTreeMap::new());
  };
  let streets: Vec<(String, String)> = sqlx::query_as(sql(Query::ConcentricStreets))
    .bind(event_id)
    .fetch_all(&mut *conn)
    .await?;
  Ok(streets.into_iter().collect())
}

async fn insert_street(
  conn: &mut PgConnection,
  event: &Event,
  id: &str,
  name: &str,
) -> Result<()> {
  let event_id = require_event(conn, event).await?;
  sqlx::query(sql(Query::CreateConcentricStreet))
    .bind(event_id)
    .bind(id)
    .bind(name)
    .execute(&mut *conn)
    .await?;
  Ok(())
}

// ─── Incident reads ──────────────────────────────────────────────────────────

async fn read_incidents(conn: &mut PgConnection, event: &Event) -> Result<Vec<Incident>> {
  let Some(event_id) = event_id(conn, event).await? else {
    return Ok(Vec::new());
  };
  let raws: Vec<RawIncident> = sqlx::query_as(sql(Query::Incidents))
    .bind(event_id)
    .fetch_all(&mut *conn)
    .await?;
  let mut entries = group_entries(
    sqlx::query_as(sql(Query::IncidentsReportEntries))
      .bind(event_id)
      .fetch_all(&mut *conn)
      .await?,
  )?;

  raws
    .into_iter()
    .map(|raw| {
      let number = decode_number(raw.number)?;
      raw.into_incident(event, entries.remove(&number).unwrap_or_default())
    })
    .collect()
}

async fn read_incident(
  conn: &mut PgConnection,
  event: &Event,
  number: u32,
) -> Result<Incident> {
  let event_id = event_id(conn, event)
    .await?
    .ok_or_else(|| no_such_incident(event, number))?;
  let raw: RawIncident = sqlx::query_as(sql(Query::Incident))
    .bind(event_id)
    .bind(encode_number(number))
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| no_such_incident(event, number))?;
  let entries: Vec<RawReportEntry> = sqlx::query_as(sql(Query::IncidentReportEntries))
    .bind(event_id)
    .bind(encode_number(number))
    .fetch_all(&mut *conn)
    .await?;
  let mut entries = group_entries(entries)?;
  raw.into_incident(event, entries.remove(&number).unwrap_or_default())
}

// ─── Incident writes ─────────────────────────────────────────────────────────

async fn insert_report_entry(conn: &mut PgConnection, entry: &ReportEntry) -> Result<i64> {
  Ok(
    sqlx::query_scalar(sql(Query::CreateReportEntry))
      .bind(&entry.author)
      .bind(&entry.text)
      .bind(entry.created)
      .bind(entry.automatic)
      .fetch_one(&mut *conn)
      .await?,
  )
}

async fn attach_incident_entries(
  conn: &mut PgConnection,
  event_id: i64,
  number: u32,
  entries: &[ReportEntry],
) -> Result<()> {
  for entry in entries {
    let entry_id = insert_report_entry(conn, entry).await?;
    sqlx::query(sql(Query::AttachReportEntryToIncident))
      .bind(event_id)
      .bind(encode_number(number))
      .bind(entry_id)
      .execute(&mut *conn)
      .await?;
  }
  Ok(())
}

async fn replace_ranger_handles(
  conn: &mut PgConnection,
  event_id: i64,
  number: u32,
  handles: &BTreeSet<String>,
) -> Result<()> {
  sqlx::query(sql(Query::ClearIncidentRangerHandles))
    .bind(event_id)
    .bind(encode_number(number))
    .execute(&mut *conn)
    .await?;
  for handle in handles {
    sqlx::query(sql(Query::AttachRangerHandleToIncident))
      .bind(event_id)
      .bind(encode_number(number))
      .bind(handle)
      .execute(&mut *conn)
      .await?;
  }
  Ok(())
}

async fn replace_incident_types(
  conn: &mut PgConnection,
  event_id: i64,
  number: u32,
  types: &BTreeSet<String>,
) -> Result<()> {
  sqlx::query(sql(Query::ClearIncidentTypes))
    .bind(event_id)
    .bind(encode_number(number))
    .execute(&mut *conn)
    .await?;
  for name in types {
    let type_id = incident_type_id(conn, name).await?;
    sqlx::query(sql(Query::AttachIncidentTypeToIncident))
      .bind(event_id)
      .bind(encode_number(number))
      .bind(type_id)
      .execute(&mut *conn)
      .await?;
  }
  Ok(())
}

async fn insert_incident(
  conn: &mut PgConnection,
  event_id: i64,
  incident: &Incident,
) -> Result<()> {
  let address = &incident.location.address;
  if let Some(concentric) = address.concentric() {
    require_concentric_street(conn, event_id, concentric).await?;
  }
  sqlx::query(sql(Query::CreateIncident))
    .bind(event_id)
    .bind(encode_number(incident.number))
    .bind(incident.created)
    .bind(incident.priority.to_stored())
    .bind(incident.state.as_ref())
    .bind(&incident.summary)
    .bind(&incident.location.name)
    .bind(address.concentric())
    .bind(encode_radial(address.radial_hour()))
    .bind(encode_radial(address.radial_minute()))
    .bind(address.description())
    .execute(&mut *conn)
    .await?;
  replace_ranger_handles(conn, event_id, incident.number, &incident.ranger_handles).await?;
  replace_incident_types(conn, event_id, incident.number, &incident.incident_types).await?;
  attach_incident_entries(conn, event_id, incident.number, &incident.report_entries).await
}

async fn set_incident_column(
  conn: &mut PgConnection,
  event_id: i64,
  number: u32,
  change: &IncidentChange,
) -> Result<()> {
  if let IncidentChange::LocationConcentric(Some(id)) = change {
    require_concentric_street(conn, event_id, id).await?;
  }
  let statement = sqlx::query(sql(Query::SetIncidentColumn(change.column())))
    .bind(event_id)
    .bind(encode_number(number));
  let statement = match change {
    IncidentChange::Priority(p) => statement.bind(p.to_stored()),
    IncidentChange::State(s) => statement.bind(s.as_ref()),
    IncidentChange::Summary(v)
    | IncidentChange::LocationName(v)
    | IncidentChange::LocationConcentric(v)
    | IncidentChange::LocationDescription(v) => statement.bind(v.as_deref()),
    IncidentChange::LocationRadialHour(v)
    | IncidentChange::LocationRadialMinute(v) => statement.bind(encode_radial(*v)),
  };
  statement.execute(&mut *conn).await?;
  Ok(())
}

async fn create_incident_in(
  conn: &mut PgConnection,
  mut incident: Incident,
) -> Result<Incident> {
  let event_id = require_event(conn, &incident.event).await?;
  sqlx::query(LOCK_EVENT)
    .bind(event_id)
    .execute(&mut *conn)
    .await?;
  let next: i64 = sqlx::query_scalar(sql(Query::NextIncidentNumber))
    .bind(event_id)
    .fetch_one(&mut *conn)
    .await?;
  incident.number = decode_number(next)?;
  insert_incident(conn, event_id, &incident).await?;
  read_incident(conn, &incident.event, incident.number).await
}

async fn import_incident_in(conn: &mut PgConnection, incident: Incident) -> Result<Incident> {
  let event_id = require_event(conn, &incident.event).await?;
  insert_incident(conn, event_id, &incident).await?;
  read_incident(conn, &incident.event, incident.number).await
}

async fn apply_incident_delta_in(
  conn: &mut PgConnection,
  event: &Event,
  number: u32,
  delta: &IncidentDelta,
) -> Result<()> {
  let (event_id, state) = locate_incident(conn, event, number).await?;

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
    set_incident_column(conn, event_id, number, change).await?;
  }
  if let Some(handles) = delta.new_ranger_handles() {
    replace_ranger_handles(conn, event_id, number, handles).await?;
  }
  if let Some(types) = delta.new_incident_types() {
    replace_incident_types(conn, event_id, number, types).await?;
  }
  attach_incident_entries(conn, event_id, number, delta.report_entries()).await
}

/// Read, diff and write under the incident's row lock.
async fn edit_incident_in(
  conn: &mut PgConnection,
  event: &Event,
  number: u32,
  edit: &IncidentEdit,
  author: &str,
) -> Result<Incident> {
  locate_incident(conn, event, number).await?;
  let before = read_incident(conn, event, number).await?;
  let delta = edit::diff_incident(&before, edit, author, now())?;
  if delta.is_empty() {
    return Ok(before);
  }
  apply_incident_delta_in(conn, event, number, &delta).await?;
  read_incident(conn, event, number).await
}

// ─── Field reports ───────────────────────────────────────────────────────────

async fn assemble_field_reports(
  conn: &mut PgConnection,
  event: &Event,
  event_id: i64,
  raws: Vec<RawFieldReport>,
) -> Result<Vec<FieldReport>> {
  let mut entries = group_entries(
    sqlx::query_as(sql(Query::FieldReportsReportEntries))
      .bind(event_id)
      .fetch_all(&mut *conn)
      .await?,
  )?;
  raws
    .into_iter()
    .map(|raw| {
      let number = decode_number(raw.number)?;
      raw.into_field_report(event, entries.remove(&number).unwrap_or_default())
    })
    .collect()
}

/// Field reports of `event` selected by `query`, which takes the event ID
/// and optionally an incident number.
async fn read_field_reports(
  conn: &mut PgConnection,
  event: &Event,
  query: Query,
  incident_number: Option<u32>,
) -> Result<Vec<FieldReport>> {
  let Some(event_id) = event_id(conn, event).await? else {
    return Ok(Vec::new());
  };
  let mut statement = sqlx::query_as(sql(query)).bind(event_id);
  if let Some(incident_number) = incident_number {
    statement = statement.bind(encode_number(incident_number));
  }
  let raws: Vec<RawFieldReport> = statement.fetch_all(&mut *conn).await?;
  assemble_field_reports(conn, event, event_id, raws).await
}

async fn read_field_report(
  conn: &mut PgConnection,
  event: &Event,
  number: u32,
) -> Result<FieldReport> {
  let event_id = event_id(conn, event)
    .await?
    .ok_or_else(|| no_such_field_report(event, number))?;
  let raw: RawFieldReport = sqlx::query_as(sql(Query::FieldReport))
    .bind(event_id)
    .bind(encode_number(number))
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| no_such_field_report(event, number))?;
  let entries: Vec<RawReportEntry> =
    sqlx::query_as(sql(Query::FieldReportReportEntries))
      .bind(event_id)
      .bind(encode_number(number))
      .fetch_all(&mut *conn)
      .await?;
  let mut entries = group_entries(entries)?;
  raw.into_field_report(event, entries.remove(&number).unwrap_or_default())
}

async fn attach_field_report_entries(
  conn: &mut PgConnection,
  event_id: i64,
  number: u32,
  entries: &[ReportEntry],
) -> Result<()> {
  for entry in entries {
    let entry_id = insert_report_entry(conn, entry).await?;
    sqlx::query(sql(Query::AttachReportEntryToFieldReport))
      .bind(event_id)
      .bind(encode_number(number))
      .bind(entry_id)
      .execute(&mut *conn)
      .await?;
  }
  Ok(())
}

async fn insert_field_report(
  conn: &mut PgConnection,
  event_id: i64,
  report: &FieldReport,
) -> Result<()> {
  if let Some(incident_number) = report.incident_number {
    locate_incident(conn, &report.event, incident_number).await?;
  }
  sqlx::query(sql(Query::CreateFieldReport))
    .bind(event_id)
    .bind(encode_number(report.number))
    .bind(report.created)
    .bind(&report.summary)
    .bind(report.incident_number.map(encode_number))
    .execute(&mut *conn)
    .await?;
  attach_field_report_entries(conn, event_id, report.number, &report.report_entries).await
}

async fn create_field_report_in(
  conn: &mut PgConnection,
  mut report: FieldReport,
) -> Result<FieldReport> {
  let event_id = require_event(conn, &report.event).await?;
  sqlx::query(LOCK_FIELD_REPORTS).execute(&mut *conn).await?;
  let next: i64 = sqlx::query_scalar(sql(Query::NextFieldReportNumber))
    .fetch_one(&mut *conn)
    .await?;
  report.number = decode_number(next)?;
  insert_field_report(conn, event_id, &report).await?;
  read_field_report(conn, &report.event, report.number).await
}

async fn import_field_report_in(
  conn: &mut PgConnection,
  report: FieldReport,
) -> Result<FieldReport> {
  let event_id = require_event(conn, &report.event).await?;
  insert_field_report(conn, event_id, &report).await?;
  read_field_report(conn, &report.event, report.number).await
}

async fn apply_field_report_delta_in(
  conn: &mut PgConnection,
  event: &Event,
  number: u32,
  delta: &FieldReportDelta,
) -> Result<()> {
  let (event_id, _) = locate_field_report(conn, event, number).await?;
  if let Some(summary) = delta.new_summary() {
    sqlx::query(sql(Query::SetFieldReportColumn(FieldReportColumn::Summary)))
      .bind(event_id)
      .bind(encode_number(number))
      .bind(summary)
      .execute(&mut *conn)
      .await?;
  }
  attach_field_report_entries(conn, event_id, number, delta.report_entries()).await
}

async fn edit_field_report_in(
  conn: &mut PgConnection,
  event: &Event,
  number: u32,
  edit: &FieldReportEdit,
  author: &str,
) -> Result<FieldReport> {
  locate_field_report(conn, event, number).await?;
  let before = read_field_report(conn, event, number).await?;
  let delta = edit::diff_field_report(&before, edit, author, now())?;
  if delta.is_empty() {
    return Ok(before);
  }
  apply_field_report_delta_in(conn, event, number, &delta).await?;
  read_field_report(conn, event, number).await
}

/// Point a field report at `incident_number` (or at nothing) and record the
/// change on the report.
async fn set_attachment(
  conn: &mut PgConnection,
  event_id: i64,
  number: u32,
  incident_number: Option<u32>,
  entry: ReportEntry,
) -> Result<()> {
  sqlx::query(sql(Query::SetFieldReportColumn(FieldReportColumn::IncidentNumber)))
    .bind(event_id)
    .bind(encode_number(number))
    .bind(incident_number.map(encode_number))
    .execute(&mut *conn)
    .await?;
  attach_field_report_entries(conn, event_id, number, &[entry]).await
}

async fn attach_in(
  conn: &mut PgConnection,
  field_report_number: u32,
  event: &Event,
  incident_number: u32,
  entry: ReportEntry,
) -> Result<FieldReport> {
  let (event_id, current) = locate_field_report(conn, event, field_report_number).await?;
  locate_incident(conn, event, incident_number).await?;
  if current != Some(incident_number) {
    set_attachment(conn, event_id, field_report_number, Some(incident_number), entry)
      .await?;
  }
  read_field_report(conn, event, field_report_number).await
}

async fn detach_in(
  conn: &mut PgConnection,
  field_report_number: u32,
  event: &Event,
  incident_number: u32,
  entry: ReportEntry,
) -> Result<FieldReport> {
  let (event_id, current) = locate_field_report(conn, event, field_report_number).await?;
  if current == Some(incident_number) {
    set_attachment(conn, event_id, field_report_number, None, entry).await?;
  }
  read_field_report(conn, event, field_report_number).await
}

// ─── IncidentStore impl ──────────────────────────────────────────────────────

impl IncidentStore for PostgresStore {
  // ── Events ────────────────────────────────────────────────────────────────

  async fn events(&self) -> ims_core::Result<Vec<Event>> {
    let names: Vec<String> = sqlx::query_scalar(sql(Query::Events))
      .fetch_all(&self.pool)
      .await
      .map_err(Error::from)?;
    Ok(names.into_iter().map(Event::new).collect())
  }

  async fn create_event(&self, event: &Event) -> ims_core::Result<()> {
    sqlx::query(sql(Query::CreateEvent))
      .bind(&event.id)
      .execute(&self.pool)
      .await
      .map_err(Error::from)?;
    info!(event = %event, "created event");
    Ok(())
  }

  async fn access(
    &self,
    event: &Event,
    mode: AccessMode,
  ) -> ims_core::Result<Vec<String>> {
    let mut tx = self.begin().await?;
    let result = read_access(&mut tx, event, mode).await;
    Ok(finish(tx, result).await?)
  }

  async fn set_access(
    &self,
    event: &Event,
    mode: AccessMode,
    expressions: Vec<String>,
  ) -> ims_core::Result<()> {
    let expressions: BTreeSet<String> = expressions.into_iter().collect();
    let mut tx = self.begin().await?;
    let result = replace_access(&mut tx, event, mode, &expressions).await;
    Ok(finish(tx, result).await?)
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
    let rows: Vec<(String, bool)> = sqlx::query_as(sql(query))
      .fetch_all(&self.pool)
      .await
      .map_err(Error::from)?;
    Ok(
      rows
        .into_iter()
        .map(|(name, hidden)| IncidentType { name, hidden })
        .collect(),
    )
  }

  async fn create_incident_type(&self, name: &str, hidden: bool) -> ims_core::Result<()> {
    sqlx::query(sql(Query::CreateIncidentType))
      .bind(name)
      .bind(hidden)
      .execute(&self.pool)
      .await
      .map_err(Error::from)?;
    Ok(())
  }

  async fn set_incident_types_hidden(
    &self,
    names: &[String],
    hidden: bool,
  ) -> ims_core::Result<()> {
    let mut tx = self.begin().await?;
    let result = hide_or_show_types(&mut tx, names, hidden).await;
    Ok(finish(tx, result).await?)
  }

  // ── Concentric streets ────────────────────────────────────────────────────

  async fn concentric_streets(
    &self,
    event: &Event,
  ) -> ims_core::Result<BTreeMap<String, String>> {
    let mut tx = self.begin().await?;
    let result = read_streets(&mut tx, event).await;
    Ok(finish(tx, result).await?)
  }

  async fn create_concentric_street(
    &self,
    event: &Event,
    id: &str,
    name: &str,
  ) -> ims_core::Result<()> {
    let mut tx = self.begin().await?;
    let result = insert_street(&mut tx, event, id, name).await;
    Ok(finish(tx, result).await?)
  }

  // ── Incidents ─────────────────────────────────────────────────────────────

  async fn incidents(&self, event: &Event) -> ims_core::Result<Vec<Incident>> {
    let mut tx = self.begin().await?;
    let result = read_incidents(&mut tx, event).await;
    Ok(finish(tx, result).await?)
  }

  async fn incident_with_number(
    &self,
    event: &Event,
    number: u32,
  ) -> ims_core::Result<Incident> {
    let mut tx = self.begin().await?;
    let result = read_incident(&mut tx, event, number).await;
    Ok(finish(tx, result).await?)
  }

  async fn create_incident(
    &self,
    incident: Incident,
    author: &str,
  ) -> ims_core::Result<Incident> {
    let incident = edit::prepare_new_incident(incident, author, now())?;
    let mut tx = self.begin().await?;
    let result = create_incident_in(&mut tx, incident).await;
    let created = finish(tx, result).await?;
    debug!(event = %created.event, number = created.number, "created incident");
    Ok(created)
  }

  async fn import_incident(&self, incident: Incident) -> ims_core::Result<Incident> {
    if incident.number == 0 {
      return Err(ims_core::Error::InvalidValue(
        "imported incident must carry its number".into(),
      ));
    }
    let mut tx = self.begin().await?;
    let result = import_incident_in(&mut tx, incident).await;
    let imported = finish(tx, result).await?;
    debug!(event = %imported.event, number = imported.number, "imported incident");
    Ok(imported)
  }

  async fn apply_incident_delta(
    &self,
    event: &Event,
    number: u32,
    delta: IncidentDelta,
  ) -> ims_core::Result<()> {
    let mut tx = self.begin().await?;
    let result = apply_incident_delta_in(&mut tx, event, number, &delta).await;
    finish(tx, result).await?;
    debug!(
      event = %event,
      number,
      changes = delta.scalar_changes().len(),
      entries = delta.report_entries().len(),
      "applied incident delta"
    );
    Ok(())
  }

  async fn edit_incident(
    &self,
    event: &Event,
    number: u32,
    edit: IncidentEdit,
    author: &str,
  ) -> ims_core::Result<Incident> {
    let mut tx = self.begin().await?;
    let result = edit_incident_in(&mut tx, event, number, &edit, author).await;
    Ok(finish(tx, result).await?)
  }

  // ── Field reports ─────────────────────────────────────────────────────────

  async fn field_reports(&self, event: &Event) -> ims_core::Result<Vec<FieldReport>> {
    let mut tx = self.begin().await?;
    let result = read_field_reports(&mut tx, event, Query::FieldReports, None).await;
    Ok(finish(tx, result).await?)
  }

  async fn field_report_with_number(
    &self,
    event: &Event,
    number: u32,
  ) -> ims_core::Result<FieldReport> {
    let mut tx = self.begin().await?;
    let result = read_field_report(&mut tx, event, number).await;
    Ok(finish(tx, result).await?)
  }

  async fn create_field_report(
    &self,
    report: FieldReport,
    author: &str,
  ) -> ims_core::Result<FieldReport> {
    let report = edit::prepare_new_field_report(report, author, now())?;
    let mut tx = self.begin().await?;
    let result = create_field_report_in(&mut tx, report).await;
    let created = finish(tx, result).await?;
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
    let mut tx = self.begin().await?;
    let result = import_field_report_in(&mut tx, report).await;
    Ok(finish(tx, result).await?)
  }

  async fn apply_field_report_delta(
    &self,
    event: &Event,
    number: u32,
    delta: FieldReportDelta,
  ) -> ims_core::Result<()> {
    let mut tx = self.begin().await?;
    let result = apply_field_report_delta_in(&mut tx, event, number, &delta).await;
    finish(tx, result).await?;
    debug!(event = %event, number, "applied field report delta");
    Ok(())
  }

  async fn edit_field_report(
    &self,
    event: &Event,
    number: u32,
    edit: FieldReportEdit,
    author: &str,
  ) -> ims_core::Result<FieldReport> {
    let mut tx = self.begin().await?;
    let result = edit_field_report_in(&mut tx, event, number, &edit, author).await;
    Ok(finish(tx, result).await?)
  }

  // ── Attachment ────────────────────────────────────────────────────────────

  async fn attach_field_report_to_incident(
    &self,
    field_report_number: u32,
    event: &Event,
    incident_number: u32,
    author: &str,
  ) -> ims_core::Result<FieldReport> {
    let entry = edit::attachment_entry(incident_number, true, author, now());
    let mut tx = self.begin().await?;
    let result =
      attach_in(&mut tx, field_report_number, event, incident_number, entry).await;
    Ok(finish(tx, result).await?)
  }

  async fn detach_field_report_from_incident(
    &self,
    field_report_number: u32,
    event: &Event,
    incident_number: u32,
    author: &str,
  ) -> ims_core::Result<FieldReport> {
    let entry = edit::attachment_entry(incident_number, false, author, now());
    let mut tx = self.begin().await?;
    let result =
      detach_in(&mut tx, field_report_number, event, incident_number, entry).await;
    Ok(finish(tx, result).await?)
  }

  async fn field_reports_attached_to_incident(
    &self,
    event: &Event,
    incident_number: u32,
  ) -> ims_core::Result<Vec<FieldReport>> {
    let mut tx = self.begin().await?;
    let result = read_field_reports(
      &mut tx,
      event,
      Query::FieldReportsAttachedToIncident,
      Some(incident_number),
    )
    .await;
    Ok(finish(tx, result).await?)
  }

  async fn detached_field_reports(
    &self,
    event: &Event,
  ) -> ims_core::Result<Vec<FieldReport>> {
    let mut tx = self.begin().await?;
    let result =
      read_field_reports(&mut tx, event, Query::DetachedFieldReports, None).await;
    Ok(finish(tx, result).await?)
  }
}
