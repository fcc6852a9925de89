//! Integration tests for `PostgresStore`.
//!
//! These run against the server named by `IMS_TEST_DATABASE_URL`, each test
//! in a schema of its own, and pass trivially when the variable is unset.

use std::{
  collections::BTreeSet,
  sync::atomic::{AtomicUsize, Ordering},
};

use chrono::{TimeZone as _, Utc};
use ims_core::{
  Error as CoreError, StorageError,
  edit::IncidentEdit,
  event::Event,
  field_report::FieldReport,
  incident::{Incident, IncidentPriority, IncidentState},
  location::{Address, Location, RodGarettAddress},
  report_entry::{ReportEntry, now},
  store::IncidentStore,
};
use sqlx::PgPool;
use tokio::task::JoinSet;

use crate::{Error, PostgresConfig, PostgresStore, schema::SCHEMA_1};

const AUTHOR: &str = "Hubcap";

static SCHEMAS: AtomicUsize = AtomicUsize::new(0);

/// A fresh schema on the test server, optionally seeded with `script`.
async fn test_schema(script: Option<&str>) -> Option<PostgresConfig> {
  let url = std::env::var("IMS_TEST_DATABASE_URL").ok()?;
  let schema = format!(
    "ims_test_{}_{}",
    std::process::id(),
    SCHEMAS.fetch_add(1, Ordering::Relaxed)
  );

  let admin = PgPool::connect(&url).await.expect("test database");
  let mut setup = format!("drop schema if exists {schema} cascade; create schema {schema};");
  if let Some(script) = script {
    setup.push_str(&format!("set search_path to {schema};\n{script}"));
  }
  let mut conn = admin.acquire().await.unwrap();
  sqlx::raw_sql(&setup).execute(&mut *conn).await.unwrap();
  drop(conn);
  admin.close().await;

  Some(PostgresConfig {
    url,
    max_connections: 4,
    acquire_timeout_seconds: 10,
    schema: Some(schema),
  })
}

macro_rules! store {
  () => {{
    let Some(config) = test_schema(None).await else {
      return;
    };
    let store = PostgresStore::connect(&config).await.unwrap();
    store.create_event(&event()).await.unwrap();
    store
  }};
}

fn event() -> Event { Event::new("foo") }

fn new_incident(text: &str) -> Incident {
  let mut incident = Incident::new(event(), now());
  incident.report_entries = vec![ReportEntry::new(now(), AUTHOR, text)];
  incident
}

fn new_field_report(text: &str) -> FieldReport {
  let mut report = FieldReport::new(event(), now());
  report.report_entries = vec![ReportEntry::new(now(), AUTHOR, text)];
  report
}

fn automatic(entries: &[ReportEntry]) -> Vec<&str> {
  entries
    .iter()
    .filter(|e| e.automatic)
    .map(|e| e.text.as_str())
    .collect()
}

// ─── Events and types ────────────────────────────────────────────────────────

#[tokio::test]
async fn events_and_access() {
  let s = store!();
  s.create_event(&Event::new("bar")).await.unwrap();
  assert_eq!(s.events().await.unwrap(), vec![event(), Event::new("bar")]);
  assert!(s.create_event(&event()).await.unwrap_err().is_storage());

  s.set_writers(&event(), vec!["person:Tool".into(), "*".into()])
    .await
    .unwrap();
  assert_eq!(s.writers(&event()).await.unwrap(), vec!["*", "person:Tool"]);
  assert!(s.readers(&event()).await.unwrap().is_empty());
  assert!(matches!(
    s.set_readers(&Event::new("nope"), vec![]).await,
    Err(CoreError::NoSuchEvent(_))
  ));
}

#[tokio::test]
async fn incident_types_hide_and_show() {
  let s = store!();
  s.create_incident_type("Medical", false).await.unwrap();
  s.hide_incident_types(&["Junk".into()]).await.unwrap();

  let visible: Vec<_> =
    s.incident_types(false).await.unwrap().into_iter().map(|t| t.name).collect();
  assert_eq!(visible, vec!["Admin", "Medical"]);
  assert_eq!(s.incident_types(true).await.unwrap().len(), 3);
  assert!(matches!(
    s.show_incident_types(&["Nope".into()]).await,
    Err(CoreError::InvalidValue(_))
  ));
}

// ─── Incidents ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn man_overboard_scenario() {
  let s = store!();
  let created = s.create_incident(new_incident("Man overboard!"), AUTHOR).await.unwrap();
  assert_eq!(created.number, 1);
  assert_eq!(created.summary_from_report(), Some("Man overboard!"));

  s.set_incident_priority(&event(), 1, IncidentPriority::High, AUTHOR)
    .await
    .unwrap();
  let after = s.incident_with_number(&event(), 1).await.unwrap();
  assert_eq!(automatic(&after.report_entries), vec!["Changed priority to: high"]);

  let mut expected = created;
  expected.priority = IncidentPriority::High;
  expected.report_entries = after.report_entries.clone();
  assert_eq!(after, expected);
}

#[tokio::test]
async fn incident_round_trips() {
  let s = store!();
  s.create_concentric_street(&event(), "3", "Carousel").await.unwrap();

  let mut input = new_incident("Lost child.");
  input.priority = IncidentPriority::Low;
  input.summary = Some("Lost child".into());
  input.location = Location::new(
    Some("Thunderdome".into()),
    Some(Address::RodGarett(RodGarettAddress {
      concentric:    Some("3".into()),
      radial_hour:   Some(9),
      radial_minute: Some(30),
      description:   None,
    })),
  );
  input.ranger_handles = BTreeSet::from(["Tool".to_owned()]);
  input.incident_types = BTreeSet::from(["Admin".to_owned()]);

  let stored = s.create_incident(input.clone(), AUTHOR).await.unwrap();
  assert_eq!(s.incident_with_number(&event(), 1).await.unwrap(), stored);
  assert_eq!(s.incidents(&event()).await.unwrap(), vec![stored.clone()]);

  let mut expected = input;
  expected.number = 1;
  let mut actual = stored;
  actual.report_entries.retain(|e| !e.automatic);
  assert_eq!(actual, expected);
}

#[tokio::test]
async fn concurrent_creation_never_repeats_a_number() {
  let s = store!();

  let mut tasks = JoinSet::new();
  for i in 0..12 {
    let s = s.clone();
    tasks.spawn(async move {
      s.create_incident(new_incident(&format!("report {i}")), AUTHOR)
        .await
        .map(|incident| incident.number)
    });
  }
  let mut numbers = Vec::new();
  while let Some(joined) = tasks.join_next().await {
    numbers.push(joined.unwrap().unwrap());
  }
  numbers.sort();
  assert_eq!(numbers, (1..=12).collect::<Vec<u32>>());
}

#[tokio::test]
async fn state_rules_and_rollback() {
  let s = store!();
  s.create_incident(new_incident("x"), AUTHOR).await.unwrap();

  assert!(matches!(
    s.set_incident_state(&event(), 1, IncidentState::OnScene, AUTHOR).await,
    Err(CoreError::EditNotAllowed(_))
  ));

  let edit = IncidentEdit {
    summary: Some(Some("Changed".into())),
    incident_types: Some(BTreeSet::from(["Unheard Of".to_owned()])),
    ..Default::default()
  };
  assert!(matches!(
    s.edit_incident(&event(), 1, edit, AUTHOR).await,
    Err(CoreError::InvalidValue(_))
  ));

  let incident = s.incident_with_number(&event(), 1).await.unwrap();
  assert_eq!(incident.state, IncidentState::New);
  assert_eq!(incident.summary, None);
  assert_eq!(incident.report_entries.len(), 1);
  assert!(matches!(
    s.incident_with_number(&event(), 2).await,
    Err(CoreError::NoSuchIncident { number: 2, .. })
  ));
}

#[tokio::test]
async fn creation_checks_state_and_street() {
  let s = store!();
  let mut on_scene = new_incident("x");
  on_scene.state = IncidentState::OnScene;
  assert!(matches!(
    s.create_incident(on_scene, AUTHOR).await,
    Err(CoreError::EditNotAllowed(_))
  ));

  s.create_incident(new_incident("x"), AUTHOR).await.unwrap();
  assert!(matches!(
    s.set_incident_location_concentric(&event(), 1, Some("9".into()), AUTHOR).await,
    Err(CoreError::InvalidValue(_))
  ));
  let incident = s.incident_with_number(&event(), 1).await.unwrap();
  assert_eq!(incident.location.address.concentric(), None);
  assert_eq!(incident.report_entries.len(), 1);
}

#[tokio::test]
async fn concurrent_edits_apply_one_after_another() {
  let s = store!();
  s.create_incident(new_incident("x"), AUTHOR).await.unwrap();

  let mut tasks = JoinSet::new();
  for i in 0..8 {
    let s = s.clone();
    tasks.spawn(async move {
      let edit = IncidentEdit {
        ranger_handles: Some(BTreeSet::from([format!("R{i}")])),
        ..Default::default()
      };
      s.edit_incident(&event(), 1, edit, AUTHOR).await
    });
  }
  while let Some(joined) = tasks.join_next().await {
    joined.unwrap().unwrap();
  }

  let incident = s.incident_with_number(&event(), 1).await.unwrap();
  let texts = automatic(&incident.report_entries);
  let removals = texts
    .iter()
    .filter(|text| text.contains("Removed from Rangers: "))
    .count();
  assert_eq!(incident.ranger_handles.len(), 1);
  assert_eq!(texts.len(), 8);
  assert_eq!(removals, 7);
}

// ─── Field reports ───────────────────────────────────────────────────────────

#[tokio::test]
async fn field_reports_attach_and_detach() {
  let s = store!();
  s.create_incident(new_incident("x"), AUTHOR).await.unwrap();
  let first = s.create_field_report(new_field_report("a"), AUTHOR).await.unwrap();
  let second = s.create_field_report(new_field_report("b"), AUTHOR).await.unwrap();
  assert_eq!((first.number, second.number), (1, 2));

  let attached = s.attach_field_report_to_incident(2, &event(), 1, AUTHOR).await.unwrap();
  assert_eq!(attached.incident_number, Some(1));
  assert_eq!(
    s.incident_with_number(&event(), 1).await.unwrap().field_report_numbers,
    BTreeSet::from([2])
  );
  let detached: Vec<_> = s
    .detached_field_reports(&event())
    .await
    .unwrap()
    .into_iter()
    .map(|r| r.number)
    .collect();
  assert_eq!(detached, vec![1]);

  let report = s.detach_field_report_from_incident(2, &event(), 1, AUTHOR).await.unwrap();
  assert_eq!(report.incident_number, None);
  assert_eq!(
    automatic(&report.report_entries),
    vec!["Attached to incident: 1", "Detached from incident: 1"]
  );
  assert!(s.field_reports_attached_to_incident(&event(), 1).await.unwrap().is_empty());

  let mut report = new_field_report("c");
  report.incident_number = Some(1);
  let created = s.create_field_report(report, AUTHOR).await.unwrap();
  assert_eq!(automatic(&created.report_entries), vec!["Attached to incident: 1"]);
}

// ─── Schema ──────────────────────────────────────────────────────────────────

const VERSION_1_DATA: &str = "
insert into EVENT (NAME) values ('2019');
insert into REPORT_ENTRY (AUTHOR, TEXT, CREATED)
  values ('Hubcap', 'Man overboard!', '2019-08-27 12:00:00+00');
insert into INCIDENT (EVENT, NUMBER, CREATED, PRIORITY, STATE)
  values (1, 1, '2019-08-27 12:00:00.25+00', 2, 'dispatched');
insert into INCIDENT__REPORT_ENTRY values (1, 1, 1);
insert into INCIDENT_REPORT (EVENT, NUMBER, CREATED, SUMMARY)
  values (1, 1, '2019-08-27 13:00:00+00', 'Boat spotted');
insert into INCIDENT__INCIDENT_REPORT values (1, 1, 1);
";

#[tokio::test]
async fn fresh_schema_is_current() {
  let Some(config) = test_schema(None).await else {
    return;
  };
  let s = PostgresStore::connect(&config).await.unwrap();
  assert_eq!(s.schema_version().await.unwrap(), crate::CURRENT_VERSION);
  s.close().await.unwrap();

  let s = PostgresStore::connect(&config).await.unwrap();
  assert_eq!(s.schema_version().await.unwrap(), crate::CURRENT_VERSION);
}

#[tokio::test]
async fn upgrade_from_version_1_preserves_data() {
  let script = format!("{SCHEMA_1}\n{VERSION_1_DATA}");
  let Some(config) = test_schema(Some(&script)).await else {
    return;
  };
  let s = PostgresStore::connect(&config).await.unwrap();
  assert_eq!(s.schema_version().await.unwrap(), crate::CURRENT_VERSION);

  let e = Event::new("2019");
  let incident = s.incident_with_number(&e, 1).await.unwrap();
  assert_eq!(
    incident.created,
    Utc.timestamp_opt(1_566_907_200, 250_000_000).unwrap()
  );
  assert_eq!(incident.priority, IncidentPriority::High);
  assert_eq!(incident.field_report_numbers, BTreeSet::from([1]));
  assert_eq!(incident.report_entries.len(), 1);
  assert!(!incident.report_entries[0].automatic);

  let report = s.field_report_with_number(&e, 1).await.unwrap();
  assert_eq!(report.incident_number, Some(1));
  assert!(s.readers(&e).await.unwrap().is_empty());
}

/// Columns and constraints of the schema `config` points at, with the
/// schema name itself removed from constraint text.
async fn schema_shape(config: &PostgresConfig) -> Vec<String> {
  let schema = config.schema.as_deref().unwrap();
  let pool = PgPool::connect(&config.url).await.unwrap();

  let columns: Vec<(String, String, String, String, String)> = sqlx::query_as(
    "select table_name::text, column_name::text, data_type::text,
            is_nullable::text, coalesce(column_default, '')::text
     from information_schema.columns
     where table_schema = $1",
  )
  .bind(schema)
  .fetch_all(&pool)
  .await
  .unwrap();

  let constraints: Vec<(String, String)> = sqlx::query_as(
    "select c.relname::text,
            replace(pg_get_constraintdef(k.oid), n.nspname || '.', '')
     from pg_constraint k
     join pg_class c on c.oid = k.conrelid
     join pg_namespace n on n.oid = c.relnamespace
     where n.nspname = $1 and k.contype in ('p', 'f', 'u', 'c')",
  )
  .bind(schema)
  .fetch_all(&pool)
  .await
  .unwrap();
  pool.close().await;

  let mut shape: Vec<String> = columns
    .into_iter()
    .map(|(table, column, kind, nullable, default)| {
      format!("{table}.{column} {kind} nullable={nullable} default={default}")
    })
    .chain(
      constraints
        .into_iter()
        .map(|(table, definition)| format!("{table}: {definition}")),
    )
    .collect();
  shape.sort();
  shape
}

#[tokio::test]
async fn upgraded_schema_matches_fresh_schema() {
  let Some(fresh) = test_schema(None).await else {
    return;
  };
  let Some(upgraded) = test_schema(Some(SCHEMA_1)).await else {
    return;
  };
  PostgresStore::connect(&fresh).await.unwrap().close().await.unwrap();
  PostgresStore::connect(&upgraded).await.unwrap().close().await.unwrap();

  let fresh = schema_shape(&fresh).await;
  let upgraded = schema_shape(&upgraded).await;
  assert!(
    fresh
      .iter()
      .any(|line| line.starts_with("incident_report.incident_number "))
  );
  assert!(!upgraded.iter().any(|line| line.starts_with("incident__incident_report")));
  assert_eq!(fresh, upgraded);
}

#[tokio::test]
async fn newer_schema_is_refused() {
  let Some(config) = test_schema(Some(
    "create table SCHEMA_INFO (VERSION smallint not null);
     insert into SCHEMA_INFO (VERSION) values (99);",
  ))
  .await
  else {
    return;
  };
  let err = PostgresStore::connect(&config).await.err().unwrap();
  assert!(matches!(
    err,
    Error::Core(CoreError::Storage(StorageError::SchemaTooNew { found: 99, current: 3 }))
  ));
}

#[tokio::test]
async fn empty_schema_info_is_corrupt() {
  let Some(config) =
    test_schema(Some("create table SCHEMA_INFO (VERSION smallint not null);")).await
  else {
    return;
  };
  let err = PostgresStore::connect(&config).await.err().unwrap();
  assert!(matches!(
    err,
    Error::Core(CoreError::Storage(StorageError::SchemaMissingVersion))
  ));
}

#[tokio::test]
async fn bad_schema_name_is_rejected_before_connecting() {
  let config = PostgresConfig {
    url: "postgres://nowhere.invalid/ims".into(),
    schema: Some("x; drop table EVENT".into()),
    ..Default::default()
  };
  assert!(matches!(
    PostgresStore::connect(&config).await,
    Err(Error::InvalidSchemaName(_))
  ));
}
