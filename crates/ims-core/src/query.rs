//! Names of every statement a store may run.
//!
//! Each backend maps every [`Query`] to constant statement text with an
//! exhaustive `match`, so a missing statement is a build failure. Both
//! dialects bind the same parameters in the same positions; the positions
//! are documented per variant.
//!
//! Per-event statements take the numeric event row ID (resolved with
//! [`Query::EventId`]) as parameter 1.

use strum::EnumCount;

pub use crate::edit::{FieldReportColumn, IncidentColumn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumCount)]
pub enum Query {
  /// `→ VERSION`
  SchemaVersion,

  // ── Events ──────────────────────────────────────────────────────────────
  /// `→ NAME` in creation order.
  Events,
  /// `(name)`
  CreateEvent,
  /// `(name) → ID`
  EventId,
  /// `(event, mode) → EXPRESSION`
  EventAccess,
  /// `(event, mode)`
  ClearEventAccess,
  /// `(event, expression, mode)`
  AddEventAccess,

  // ── Incident types ──────────────────────────────────────────────────────
  /// `→ NAME, HIDDEN`
  IncidentTypes,
  /// `→ NAME, HIDDEN` for types that are not hidden.
  VisibleIncidentTypes,
  /// `(name) → ID`
  IncidentTypeId,
  /// `(name, hidden)`
  CreateIncidentType,
  /// `(name, hidden)`
  SetIncidentTypeHidden,

  // ── Concentric streets ──────────────────────────────────────────────────
  /// `(event) → ID, NAME`
  ConcentricStreets,
  /// `(event, id, name)`
  CreateConcentricStreet,

  // ── Report entries ──────────────────────────────────────────────────────
  /// `(author, text, created, generated) → ID`
  CreateReportEntry,

  // ── Incidents ───────────────────────────────────────────────────────────
  /// `(event) → incident row` for every incident, ordered by number.
  Incidents,
  /// `(event, number) → incident row`
  Incident,
  /// `(event) → INCIDENT_NUMBER, AUTHOR, TEXT, CREATED, GENERATED`
  IncidentsReportEntries,
  /// `(event, number) → INCIDENT_NUMBER, AUTHOR, TEXT, CREATED, GENERATED`
  IncidentReportEntries,
  /// `(event, number) → STATE`. Locks the row where the engine supports it.
  CurrentIncidentState,
  /// `(event) → next number`
  NextIncidentNumber,
  /// `(event, number, created, priority, state, summary, location name,
  /// concentric, radial hour, radial minute, location description)`
  CreateIncident,
  /// `(event, number, handle)`
  AttachRangerHandleToIncident,
  /// `(event, number)`
  ClearIncidentRangerHandles,
  /// `(event, number, incident type ID)`
  AttachIncidentTypeToIncident,
  /// `(event, number)`
  ClearIncidentTypes,
  /// `(event, number, report entry ID)`
  AttachReportEntryToIncident,
  /// `(event, number, value)`
  SetIncidentColumn(IncidentColumn),

  // ── Field reports ───────────────────────────────────────────────────────
  /// `(event) → field report row` ordered by number.
  FieldReports,
  /// `(event, number) → field report row`
  FieldReport,
  /// `(event, incident number) → field report row`
  FieldReportsAttachedToIncident,
  /// `(event) → field report row` for reports with no incident.
  DetachedFieldReports,
  /// `(event) → INCIDENT_REPORT_NUMBER, AUTHOR, TEXT, CREATED, GENERATED`
  FieldReportsReportEntries,
  /// `(event, number) → INCIDENT_REPORT_NUMBER, AUTHOR, TEXT, CREATED, GENERATED`
  FieldReportReportEntries,
  /// `(event, number) → INCIDENT_NUMBER`. Locks the row where the engine
  /// supports it.
  FieldReportAttachment,
  /// `→ next number`, store-wide.
  NextFieldReportNumber,
  /// `(event, number, created, summary, incident number)`
  CreateFieldReport,
  /// `(event, number, report entry ID)`
  AttachReportEntryToFieldReport,
  /// `(event, number, value)`
  SetFieldReportColumn(FieldReportColumn),
}

impl Query {
  /// Every statement, with one entry per column update.
  pub fn all() -> Vec<Self> {
    let mut all = vec![
      Self::SchemaVersion,
      Self::Events,
      Self::CreateEvent,
      Self::EventId,
      Self::EventAccess,
      Self::ClearEventAccess,
      Self::AddEventAccess,
      Self::IncidentTypes,
      Self::VisibleIncidentTypes,
      Self::IncidentTypeId,
      Self::CreateIncidentType,
      Self::SetIncidentTypeHidden,
      Self::ConcentricStreets,
      Self::CreateConcentricStreet,
      Self::CreateReportEntry,
      Self::Incidents,
      Self::Incident,
      Self::IncidentsReportEntries,
      Self::IncidentReportEntries,
      Self::CurrentIncidentState,
      Self::NextIncidentNumber,
      Self::CreateIncident,
      Self::AttachRangerHandleToIncident,
      Self::ClearIncidentRangerHandles,
      Self::AttachIncidentTypeToIncident,
      Self::ClearIncidentTypes,
      Self::AttachReportEntryToIncident,
      Self::FieldReports,
      Self::FieldReport,
      Self::FieldReportsAttachedToIncident,
      Self::DetachedFieldReports,
      Self::FieldReportsReportEntries,
      Self::FieldReportReportEntries,
      Self::FieldReportAttachment,
      Self::NextFieldReportNumber,
      Self::CreateFieldReport,
      Self::AttachReportEntryToFieldReport,
    ];
    all.extend(IncidentColumn::ALL.map(Self::SetIncidentColumn));
    all.extend(FieldReportColumn::ALL.map(Self::SetFieldReportColumn));
    all
  }

  /// How many positional parameters the statement binds.
  pub fn parameter_count(self) -> usize {
    match self {
      Self::SchemaVersion
      | Self::Events
      | Self::IncidentTypes
      | Self::VisibleIncidentTypes
      | Self::NextFieldReportNumber => 0,
      Self::CreateEvent
      | Self::EventId
      | Self::IncidentTypeId
      | Self::ConcentricStreets
      | Self::Incidents
      | Self::IncidentsReportEntries
      | Self::NextIncidentNumber
      | Self::FieldReports
      | Self::DetachedFieldReports
      | Self::FieldReportsReportEntries => 1,
      Self::EventAccess
      | Self::ClearEventAccess
      | Self::CreateIncidentType
      | Self::SetIncidentTypeHidden
      | Self::Incident
      | Self::IncidentReportEntries
      | Self::CurrentIncidentState
      | Self::ClearIncidentRangerHandles
      | Self::ClearIncidentTypes
      | Self::FieldReport
      | Self::FieldReportsAttachedToIncident
      | Self::FieldReportReportEntries
      | Self::FieldReportAttachment => 2,
      Self::AddEventAccess
      | Self::CreateConcentricStreet
      | Self::AttachRangerHandleToIncident
      | Self::AttachIncidentTypeToIncident
      | Self::AttachReportEntryToIncident
      | Self::AttachReportEntryToFieldReport
      | Self::SetIncidentColumn(_)
      | Self::SetFieldReportColumn(_) => 3,
      Self::CreateReportEntry => 4,
      Self::CreateFieldReport => 5,
      Self::CreateIncident => 11,
    }
  }
}

/// The highest positional parameter index in `sql`, for placeholders
/// written as `<sigil><digits>` (`?1` or `$1`).
pub fn highest_parameter(sql: &str, sigil: char) -> usize {
  let mut highest = 0;
  let mut rest = sql;
  while let Some(at) = rest.find(sigil) {
    rest = &rest[at + sigil.len_utf8()..];
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    if let Ok(n) = digits.parse::<usize>() {
      highest = highest.max(n);
    }
  }
  highest
}

#[cfg(test)]
mod tests {
  use std::collections::HashSet;

  use super::*;

  #[test]
  fn all_is_unique_and_covers_columns() {
    let all = Query::all();
    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(unique.len(), all.len());
    assert!(all.contains(&Query::SetIncidentColumn(IncidentColumn::LocationRadialMinute)));
    assert!(all.contains(&Query::SetFieldReportColumn(FieldReportColumn::IncidentNumber)));
    assert_eq!(
      all.len(),
      Query::COUNT - 2 + IncidentColumn::ALL.len() + FieldReportColumn::ALL.len()
    );
  }

  #[test]
  fn all_names_every_variant() {
    let kinds: HashSet<_> = Query::all().iter().map(std::mem::discriminant).collect();
    assert_eq!(kinds.len(), Query::COUNT);
  }

  #[test]
  fn highest_parameter_reads_both_sigils() {
    assert_eq!(highest_parameter("select 1", '?'), 0);
    assert_eq!(highest_parameter("where A = ?1 and B = ?12", '?'), 12);
    assert_eq!(highest_parameter("values ($1, $3, $2)", '$'), 3);
  }
}
