//! The `IncidentStore` trait: every operation the rest of the system may
//! perform against incident data.
//!
//! The trait is implemented by storage backends (`ims-store-sqlite`,
//! `ims-store-postgres`). Callers depend on this abstraction, not on any
//! concrete backend.
//!
//! Every mutator receives the already-resolved author. Column changes and
//! the automatic entry describing them are computed by [`crate::edit`] and
//! persisted by the backend in one transaction.

use std::{
  collections::{BTreeMap, BTreeSet},
  future::Future,
};

use crate::{
  Result,
  edit::{
    FieldReportDelta, FieldReportEdit, IncidentChange, IncidentDelta,
    IncidentEdit,
  },
  event::{AccessMode, Event},
  field_report::FieldReport,
  incident::{Incident, IncidentPriority, IncidentState, IncidentType},
  report_entry::{ReportEntry, now},
};

/// Abstraction over an IMS data store backend.
///
/// Report entries are append-only: no operation edits or removes one.
/// Incidents and field reports are never deleted.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait IncidentStore: Send + Sync {
  // ── Events ────────────────────────────────────────────────────────────

  /// All events, in creation order.
  fn events(&self) -> impl Future<Output = Result<Vec<Event>>> + Send;

  /// Fails with a storage error if the event already exists.
  fn create_event(&self, event: &Event) -> impl Future<Output = Result<()>> + Send;

  /// ACL expressions granting `mode` on `event`.
  fn access(
    &self,
    event: &Event,
    mode: AccessMode,
  ) -> impl Future<Output = Result<Vec<String>>> + Send;

  /// Replace the ACL expressions granting `mode` on `event`.
  fn set_access(
    &self,
    event: &Event,
    mode: AccessMode,
    expressions: Vec<String>,
  ) -> impl Future<Output = Result<()>> + Send;

  fn readers(&self, event: &Event) -> impl Future<Output = Result<Vec<String>>> + Send {
    self.access(event, AccessMode::Read)
  }

  fn set_readers(
    &self,
    event: &Event,
    expressions: Vec<String>,
  ) -> impl Future<Output = Result<()>> + Send {
    self.set_access(event, AccessMode::Read, expressions)
  }

  fn writers(&self, event: &Event) -> impl Future<Output = Result<Vec<String>>> + Send {
    self.access(event, AccessMode::Write)
  }

  fn set_writers(
    &self,
    event: &Event,
    expressions: Vec<String>,
  ) -> impl Future<Output = Result<()>> + Send {
    self.set_access(event, AccessMode::Write, expressions)
  }

  fn reporters(&self, event: &Event) -> impl Future<Output = Result<Vec<String>>> + Send {
    self.access(event, AccessMode::Report)
  }

  fn set_reporters(
    &self,
    event: &Event,
    expressions: Vec<String>,
  ) -> impl Future<Output = Result<()>> + Send {
    self.set_access(event, AccessMode::Report, expressions)
  }

  // ── Incident types ────────────────────────────────────────────────────

  /// Incident types ordered by name, hidden ones only if asked for.
  fn incident_types(
    &self,
    include_hidden: bool,
  ) -> impl Future<Output = Result<Vec<IncidentType>>> + Send;

  fn create_incident_type(
    &self,
    name: &str,
    hidden: bool,
  ) -> impl Future<Output = Result<()>> + Send;

  /// Fails with [`crate::Error::InvalidValue`] naming the first unknown type.
  fn set_incident_types_hidden(
    &self,
    names: &[String],
    hidden: bool,
  ) -> impl Future<Output = Result<()>> + Send;

  fn show_incident_types(&self, names: &[String]) -> impl Future<Output = Result<()>> + Send {
    self.set_incident_types_hidden(names, false)
  }

  fn hide_incident_types(&self, names: &[String]) -> impl Future<Output = Result<()>> + Send {
    self.set_incident_types_hidden(names, true)
  }

  // ── Concentric streets ────────────────────────────────────────────────

  /// Street ID → street name.
  fn concentric_streets(
    &self,
    event: &Event,
  ) -> impl Future<Output = Result<BTreeMap<String, String>>> + Send;

  fn create_concentric_street(
    &self,
    event: &Event,
    id: &str,
    name: &str,
  ) -> impl Future<Output = Result<()>> + Send;

  // ── Incidents ─────────────────────────────────────────────────────────

  /// All incidents in `event`, ordered by number. Unknown events have none.
  fn incidents(&self, event: &Event) -> impl Future<Output = Result<Vec<Incident>>> + Send;

  fn incident_with_number(
    &self,
    event: &Event,
    number: u32,
  ) -> impl Future<Output = Result<Incident>> + Send;

  /// Persist a new incident under the next number in its event.
  ///
  /// `incident.number` must be `0`. Report entries must be written by
  /// `author`; an automatic entry describing the initial attributes is
  /// appended. Returns the incident as stored.
  fn create_incident(
    &self,
    incident: Incident,
    author: &str,
  ) -> impl Future<Output = Result<Incident>> + Send;

  /// Persist an incident exactly as given, number and automatic entries
  /// included. For bringing data over from another store.
  fn import_incident(
    &self,
    incident: Incident,
  ) -> impl Future<Output = Result<Incident>> + Send;

  /// Persist a delta computed by [`crate::edit`] in one transaction.
  ///
  /// A state change is checked against the state stored at that moment.
  fn apply_incident_delta(
    &self,
    event: &Event,
    number: u32,
    delta: IncidentDelta,
  ) -> impl Future<Output = Result<()>> + Send;

  /// Set one column and record `Changed <attribute> to: <value>`.
  fn set_incident_attribute(
    &self,
    event: &Event,
    number: u32,
    change: IncidentChange,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    async move {
      let delta = IncidentDelta::change(change, author, now())?;
      self.apply_incident_delta(event, number, delta).await
    }
  }

  fn set_incident_priority(
    &self,
    event: &Event,
    number: u32,
    priority: IncidentPriority,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    self.set_incident_attribute(event, number, IncidentChange::Priority(priority), author)
  }

  fn set_incident_state(
    &self,
    event: &Event,
    number: u32,
    state: IncidentState,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    self.set_incident_attribute(event, number, IncidentChange::State(state), author)
  }

  fn set_incident_summary(
    &self,
    event: &Event,
    number: u32,
    summary: Option<String>,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    self.set_incident_attribute(event, number, IncidentChange::Summary(summary), author)
  }

  fn set_incident_location_name(
    &self,
    event: &Event,
    number: u32,
    name: Option<String>,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    self.set_incident_attribute(event, number, IncidentChange::LocationName(name), author)
  }

  fn set_incident_location_concentric(
    &self,
    event: &Event,
    number: u32,
    concentric: Option<String>,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    self.set_incident_attribute(
      event,
      number,
      IncidentChange::LocationConcentric(concentric),
      author,
    )
  }

  fn set_incident_location_radial_hour(
    &self,
    event: &Event,
    number: u32,
    hour: Option<u8>,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    self.set_incident_attribute(event, number, IncidentChange::LocationRadialHour(hour), author)
  }

  fn set_incident_location_radial_minute(
    &self,
    event: &Event,
    number: u32,
    minute: Option<u8>,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    self.set_incident_attribute(
      event,
      number,
      IncidentChange::LocationRadialMinute(minute),
      author,
    )
  }

  fn set_incident_location_description(
    &self,
    event: &Event,
    number: u32,
    description: Option<String>,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    self.set_incident_attribute(
      event,
      number,
      IncidentChange::LocationDescription(description),
      author,
    )
  }

  fn set_incident_ranger_handles(
    &self,
    event: &Event,
    number: u32,
    handles: BTreeSet<String>,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    let delta = IncidentDelta::ranger_handles(handles, author, now());
    self.apply_incident_delta(event, number, delta)
  }

  /// Unknown type names fail with [`crate::Error::InvalidValue`].
  fn set_incident_incident_types(
    &self,
    event: &Event,
    number: u32,
    types: BTreeSet<String>,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    let delta = IncidentDelta::incident_types(types, author, now());
    self.apply_incident_delta(event, number, delta)
  }

  /// Append user-written entries. Automatic entries and entries written by
  /// anyone but `author` are rejected.
  fn add_report_entries_to_incident(
    &self,
    event: &Event,
    number: u32,
    entries: Vec<ReportEntry>,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    async move {
      let delta = IncidentDelta::user_entries(entries, author)?;
      self.apply_incident_delta(event, number, delta).await
    }
  }

  /// Apply a sparse edit and return the incident as it now stands.
  ///
  /// The read, the diff against [`crate::edit::diff_incident`] and the write
  /// share one transaction, so concurrent edits of one incident apply one
  /// after the other. An edit that changes nothing persists nothing.
  fn edit_incident(
    &self,
    event: &Event,
    number: u32,
    edit: IncidentEdit,
    author: &str,
  ) -> impl Future<Output = Result<Incident>> + Send;

  // ── Field reports ─────────────────────────────────────────────────────

  fn field_reports(
    &self,
    event: &Event,
  ) -> impl Future<Output = Result<Vec<FieldReport>>> + Send;

  fn field_report_with_number(
    &self,
    event: &Event,
    number: u32,
  ) -> impl Future<Output = Result<FieldReport>> + Send;

  /// Persist a new field report under the next store-wide number.
  fn create_field_report(
    &self,
    report: FieldReport,
    author: &str,
  ) -> impl Future<Output = Result<FieldReport>> + Send;

  fn import_field_report(
    &self,
    report: FieldReport,
  ) -> impl Future<Output = Result<FieldReport>> + Send;

  fn apply_field_report_delta(
    &self,
    event: &Event,
    number: u32,
    delta: FieldReportDelta,
  ) -> impl Future<Output = Result<()>> + Send;

  fn set_field_report_summary(
    &self,
    event: &Event,
    number: u32,
    summary: Option<String>,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    let delta = FieldReportDelta::summary(summary, author, now());
    self.apply_field_report_delta(event, number, delta)
  }

  fn add_report_entries_to_field_report(
    &self,
    event: &Event,
    number: u32,
    entries: Vec<ReportEntry>,
    author: &str,
  ) -> impl Future<Output = Result<()>> + Send {
    async move {
      let delta = FieldReportDelta::user_entries(entries, author)?;
      self.apply_field_report_delta(event, number, delta).await
    }
  }

  /// Apply a sparse edit in one transaction, like [`Self::edit_incident`].
  fn edit_field_report(
    &self,
    event: &Event,
    number: u32,
    edit: FieldReportEdit,
    author: &str,
  ) -> impl Future<Output = Result<FieldReport>> + Send;

  // ── Attachment ────────────────────────────────────────────────────────

  /// Attach a field report to an incident in the same event, replacing any
  /// previous attachment.
  fn attach_field_report_to_incident(
    &self,
    field_report_number: u32,
    event: &Event,
    incident_number: u32,
    author: &str,
  ) -> impl Future<Output = Result<FieldReport>> + Send;

  /// Detach a field report from an incident. Does nothing if the report is
  /// not attached to that incident.
  fn detach_field_report_from_incident(
    &self,
    field_report_number: u32,
    event: &Event,
    incident_number: u32,
    author: &str,
  ) -> impl Future<Output = Result<FieldReport>> + Send;

  fn field_reports_attached_to_incident(
    &self,
    event: &Event,
    incident_number: u32,
  ) -> impl Future<Output = Result<Vec<FieldReport>>> + Send;

  fn detached_field_reports(
    &self,
    event: &Event,
  ) -> impl Future<Output = Result<Vec<FieldReport>>> + Send;
}
