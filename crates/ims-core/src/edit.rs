//! Edit pipeline: sparse edit → column deltas + one audit entry.
//!
//! Nothing here touches storage. The functions compare a "before" entity
//! with the requested changes and produce a delta that a store persists in
//! a single transaction. A delta can only be built through this module, so
//! automatic report entries never originate from callers.

use std::{collections::BTreeSet, fmt::Display};

use chrono::{DateTime, SubsecRound as _, Utc};

use crate::{
  Error, Result,
  field_report::FieldReport,
  incident::{Incident, IncidentPriority, IncidentState},
  location::Address,
  report_entry::{ReportEntry, check_user_entries},
};

// ─── Columns ─────────────────────────────────────────────────────────────────

/// The mutable scalar columns of an incident. Stores derive their update
/// statements from this fixed set, never from caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IncidentColumn {
  Priority,
  State,
  Summary,
  LocationName,
  LocationConcentric,
  LocationRadialHour,
  LocationRadialMinute,
  LocationDescription,
}

impl IncidentColumn {
  pub const ALL: [Self; 8] = [
    Self::Priority,
    Self::State,
    Self::Summary,
    Self::LocationName,
    Self::LocationConcentric,
    Self::LocationRadialHour,
    Self::LocationRadialMinute,
    Self::LocationDescription,
  ];

  /// The attribute name used in audit entries.
  pub fn label(self) -> &'static str {
    match self {
      Self::Priority => "priority",
      Self::State => "state",
      Self::Summary => "summary",
      Self::LocationName => "location name",
      Self::LocationConcentric => "location concentric street",
      Self::LocationRadialHour => "location radial hour",
      Self::LocationRadialMinute => "location radial minute",
      Self::LocationDescription => "location description",
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldReportColumn {
  Summary,
  IncidentNumber,
}

impl FieldReportColumn {
  pub const ALL: [Self; 2] = [Self::Summary, Self::IncidentNumber];
}

const RANGERS_LABEL: &str = "Rangers";
const INCIDENT_TYPES_LABEL: &str = "incident types";

// ─── Scalar changes ──────────────────────────────────────────────────────────

/// A new value for one incident column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncidentChange {
  Priority(IncidentPriority),
  State(IncidentState),
  Summary(Option<String>),
  LocationName(Option<String>),
  LocationConcentric(Option<String>),
  LocationRadialHour(Option<u8>),
  LocationRadialMinute(Option<u8>),
  LocationDescription(Option<String>),
}

impl IncidentChange {
  pub fn column(&self) -> IncidentColumn {
    match self {
      Self::Priority(_) => IncidentColumn::Priority,
      Self::State(_) => IncidentColumn::State,
      Self::Summary(_) => IncidentColumn::Summary,
      Self::LocationName(_) => IncidentColumn::LocationName,
      Self::LocationConcentric(_) => IncidentColumn::LocationConcentric,
      Self::LocationRadialHour(_) => IncidentColumn::LocationRadialHour,
      Self::LocationRadialMinute(_) => IncidentColumn::LocationRadialMinute,
      Self::LocationDescription(_) => IncidentColumn::LocationDescription,
    }
  }

  /// `Changed <attribute> to: <value>`.
  pub fn describe(&self) -> String {
    let value = match self {
      Self::Priority(p) => p.to_string(),
      Self::State(s) => s.to_string(),
      Self::Summary(v)
      | Self::LocationName(v)
      | Self::LocationConcentric(v)
      | Self::LocationDescription(v) => show(v),
      Self::LocationRadialHour(v) | Self::LocationRadialMinute(v) => show(v),
    };
    format!("Changed {} to: {value}", self.column().label())
  }

  /// The value `incident` currently holds for `column`.
  pub fn current(incident: &Incident, column: IncidentColumn) -> Self {
    let address = &incident.location.address;
    match column {
      IncidentColumn::Priority => Self::Priority(incident.priority),
      IncidentColumn::State => Self::State(incident.state),
      IncidentColumn::Summary => Self::Summary(incident.summary.clone()),
      IncidentColumn::LocationName => {
        Self::LocationName(incident.location.name.clone())
      }
      IncidentColumn::LocationConcentric => {
        Self::LocationConcentric(address.concentric().map(str::to_owned))
      }
      IncidentColumn::LocationRadialHour => {
        Self::LocationRadialHour(address.radial_hour())
      }
      IncidentColumn::LocationRadialMinute => {
        Self::LocationRadialMinute(address.radial_minute())
      }
      IncidentColumn::LocationDescription => {
        Self::LocationDescription(address.description().map(str::to_owned))
      }
    }
  }

  /// Blank strings become absent; radial positions must be on the clock.
  pub fn normalized(self) -> Result<Self> {
    Ok(match self {
      Self::Summary(v) => Self::Summary(non_blank(v)),
      Self::LocationName(v) => Self::LocationName(non_blank(v)),
      Self::LocationConcentric(v) => Self::LocationConcentric(non_blank(v)),
      Self::LocationDescription(v) => Self::LocationDescription(non_blank(v)),
      Self::LocationRadialHour(Some(h)) if !(1..=12).contains(&h) => {
        return Err(Error::InvalidValue(format!(
          "radial hour {h} is outside 1-12"
        )));
      }
      Self::LocationRadialMinute(Some(m)) if m > 59 => {
        return Err(Error::InvalidValue(format!(
          "radial minute {m} is outside 0-59"
        )));
      }
      other => other,
    })
  }

  /// Write this value into an in-memory incident.
  pub fn apply(&self, incident: &mut Incident) {
    let address = &incident.location.address;
    let mut concentric = address.concentric().map(str::to_owned);
    let mut hour = address.radial_hour();
    let mut minute = address.radial_minute();
    let mut description = address.description().map(str::to_owned);

    match self {
      Self::Priority(p) => incident.priority = *p,
      Self::State(s) => incident.state = *s,
      Self::Summary(v) => incident.summary = v.clone(),
      Self::LocationName(v) => incident.location.name = v.clone(),
      Self::LocationConcentric(v) => concentric = v.clone(),
      Self::LocationRadialHour(v) => hour = *v,
      Self::LocationRadialMinute(v) => minute = *v,
      Self::LocationDescription(v) => description = v.clone(),
    }
    incident.location.address =
      Address::from_columns(concentric, hour, minute, description);
  }
}

fn show<T: Display>(value: &Option<T>) -> String {
  value.as_ref().map(ToString::to_string).unwrap_or_default()
}

fn non_blank(value: Option<String>) -> Option<String> {
  value.filter(|s| !s.trim().is_empty())
}

fn join<'a>(items: impl IntoIterator<Item = &'a String>) -> String {
  items
    .into_iter()
    .map(String::as_str)
    .collect::<Vec<_>>()
    .join(", ")
}

// ─── Incident delta ──────────────────────────────────────────────────────────

/// What a store must persist for one incident edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentDelta {
  changes:        Vec<IncidentChange>,
  ranger_handles: Option<BTreeSet<String>>,
  incident_types: Option<BTreeSet<String>>,
  report_entries: Vec<ReportEntry>,
}

impl IncidentDelta {
  /// Set one column, with the matching audit entry.
  pub fn change(
    change: IncidentChange,
    author: &str,
    now: DateTime<Utc>,
  ) -> Result<Self> {
    let change = change.normalized()?;
    Ok(Self {
      report_entries: vec![ReportEntry::automatic(
        now,
        author,
        change.describe(),
      )],
      changes: vec![change],
      ..Default::default()
    })
  }

  /// Replace the attached ranger handles.
  pub fn ranger_handles(
    handles: BTreeSet<String>,
    author: &str,
    now: DateTime<Utc>,
  ) -> Self {
    let text = format!("Changed {RANGERS_LABEL} to: {}", join(&handles));
    Self {
      ranger_handles: Some(handles),
      report_entries: vec![ReportEntry::automatic(now, author, text)],
      ..Default::default()
    }
  }

  /// Replace the incident types.
  pub fn incident_types(
    types: BTreeSet<String>,
    author: &str,
    now: DateTime<Utc>,
  ) -> Self {
    let text = format!("Changed {INCIDENT_TYPES_LABEL} to: {}", join(&types));
    Self {
      incident_types: Some(types),
      report_entries: vec![ReportEntry::automatic(now, author, text)],
      ..Default::default()
    }
  }

  /// Append caller-written entries, which must be attributed to `author`.
  pub fn user_entries(entries: Vec<ReportEntry>, author: &str) -> Result<Self> {
    check_user_entries(&entries, author)?;
    Ok(Self {
      report_entries: truncated(entries),
      ..Default::default()
    })
  }

  pub fn scalar_changes(&self) -> &[IncidentChange] { &self.changes }

  pub fn new_ranger_handles(&self) -> Option<&BTreeSet<String>> {
    self.ranger_handles.as_ref()
  }

  pub fn new_incident_types(&self) -> Option<&BTreeSet<String>> {
    self.incident_types.as_ref()
  }

  pub fn report_entries(&self) -> &[ReportEntry] { &self.report_entries }

  pub fn is_empty(&self) -> bool {
    self.changes.is_empty()
      && self.ranger_handles.is_none()
      && self.incident_types.is_none()
      && self.report_entries.is_empty()
  }

  /// Apply the delta to an in-memory incident.
  pub fn apply_to(&self, incident: &mut Incident) {
    for change in &self.changes {
      change.apply(incident);
    }
    if let Some(handles) = &self.ranger_handles {
      incident.ranger_handles = handles.clone();
    }
    if let Some(types) = &self.incident_types {
      incident.incident_types = types.clone();
    }
    incident
      .report_entries
      .extend(self.report_entries.iter().cloned());
    incident.report_entries.sort();
  }
}

// ─── Incident edit ───────────────────────────────────────────────────────────

/// A sparse edit of an incident. `None` leaves an attribute alone; for
/// optional attributes `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncidentEdit {
  pub number:                 Option<u32>,
  pub priority:               Option<IncidentPriority>,
  pub state:                  Option<IncidentState>,
  pub summary:                Option<Option<String>>,
  pub location_name:          Option<Option<String>>,
  pub location_concentric:    Option<Option<String>>,
  pub location_radial_hour:   Option<Option<u8>>,
  pub location_radial_minute: Option<Option<u8>>,
  pub location_description:   Option<Option<String>>,
  pub ranger_handles:         Option<BTreeSet<String>>,
  pub incident_types:         Option<BTreeSet<String>>,
  /// Text of new entries written by the editing author.
  pub report_entries:         Vec<String>,
}

impl IncidentEdit {
  /// An edit that sets every attribute to the value `incident` holds.
  fn replacing(incident: &Incident) -> Self {
    let address = &incident.location.address;
    Self {
      number:                 None,
      priority:               Some(incident.priority),
      state:                  Some(incident.state),
      summary:                Some(incident.summary.clone()),
      location_name:          Some(incident.location.name.clone()),
      location_concentric:    Some(address.concentric().map(str::to_owned)),
      location_radial_hour:   Some(address.radial_hour()),
      location_radial_minute: Some(address.radial_minute()),
      location_description:   Some(address.description().map(str::to_owned)),
      ranger_handles:         Some(incident.ranger_handles.clone()),
      incident_types:         Some(incident.incident_types.clone()),
      report_entries:         Vec::new(),
    }
  }

  fn requested_changes(&self) -> Vec<IncidentChange> {
    let mut requested = Vec::new();
    if let Some(p) = self.priority {
      requested.push(IncidentChange::Priority(p));
    }
    if let Some(s) = self.state {
      requested.push(IncidentChange::State(s));
    }
    if let Some(v) = &self.summary {
      requested.push(IncidentChange::Summary(v.clone()));
    }
    if let Some(v) = &self.location_name {
      requested.push(IncidentChange::LocationName(v.clone()));
    }
    if let Some(v) = &self.location_concentric {
      requested.push(IncidentChange::LocationConcentric(v.clone()));
    }
    if let Some(v) = self.location_radial_hour {
      requested.push(IncidentChange::LocationRadialHour(v));
    }
    if let Some(v) = self.location_radial_minute {
      requested.push(IncidentChange::LocationRadialMinute(v));
    }
    if let Some(v) = &self.location_description {
      requested.push(IncidentChange::LocationDescription(v.clone()));
    }
    requested
  }
}

/// Accumulates changed values and the sentences describing them.
#[derive(Default)]
struct Sentences(Vec<String>);

impl Sentences {
  fn set_change(
    &mut self,
    label: &str,
    old: &BTreeSet<String>,
    new: &BTreeSet<String>,
  ) -> bool {
    let added: Vec<_> = new.difference(old).collect();
    let removed: Vec<_> = old.difference(new).collect();
    if !added.is_empty() {
      self.0.push(format!("Added to {label}: {}", join(added.iter().copied())));
    }
    if !removed.is_empty() {
      self
        .0
        .push(format!("Removed from {label}: {}", join(removed.iter().copied())));
    }
    !added.is_empty() || !removed.is_empty()
  }

  fn into_entry(self, author: &str, now: DateTime<Utc>) -> Option<ReportEntry> {
    (!self.0.is_empty())
      .then(|| ReportEntry::automatic(now, author, self.0.join("\n")))
  }
}

fn user_entries(
  texts: &[String],
  author: &str,
  now: DateTime<Utc>,
) -> Result<Vec<ReportEntry>> {
  texts
    .iter()
    .map(|text| {
      if text.trim().is_empty() {
        Err(Error::InvalidValue("report entry text is empty".into()))
      } else {
        Ok(ReportEntry::new(now, author, text.clone()))
      }
    })
    .collect()
}

fn incident_delta(
  before: &Incident,
  edit: &IncidentEdit,
  author: &str,
  now: DateTime<Utc>,
) -> Result<IncidentDelta> {
  let mut sentences = Sentences::default();
  let mut delta = IncidentDelta::default();

  for requested in edit.requested_changes() {
    let change = requested.normalized()?;
    if change != IncidentChange::current(before, change.column()) {
      sentences.0.push(change.describe());
      delta.changes.push(change);
    }
  }

  if let Some(new) = &edit.ranger_handles
    && sentences.set_change(RANGERS_LABEL, &before.ranger_handles, new)
  {
    delta.ranger_handles = Some(new.clone());
  }
  if let Some(new) = &edit.incident_types
    && sentences.set_change(INCIDENT_TYPES_LABEL, &before.incident_types, new)
  {
    delta.incident_types = Some(new.clone());
  }

  delta.report_entries.extend(sentences.into_entry(author, now));
  delta
    .report_entries
    .extend(user_entries(&edit.report_entries, author, now)?);
  Ok(delta)
}

/// Compute what must be persisted to turn `before` into the edited incident.
///
/// Fails with [`Error::EditNotAllowed`] if the edit changes the number or
/// skips a required state. An edit that matches the current values yields
/// an empty delta.
pub fn diff_incident(
  before: &Incident,
  edit: &IncidentEdit,
  author: &str,
  now: DateTime<Utc>,
) -> Result<IncidentDelta> {
  if let Some(number) = edit.number
    && number != before.number
  {
    return Err(Error::EditNotAllowed(format!(
      "incident number {} cannot be changed to {number}",
      before.number
    )));
  }
  if let Some(state) = edit.state
    && !before.state.may_become(state)
  {
    return Err(Error::EditNotAllowed(format!(
      "incident #{} cannot move from {} to {state}",
      before.number, before.state
    )));
  }
  incident_delta(before, edit, author, now)
}

/// Validate and normalize an incident a caller wants created, and append the
/// automatic entry describing its initial attributes.
///
/// The number must still be the `0` placeholder; the store assigns the real
/// one.
pub fn prepare_new_incident(
  mut incident: Incident,
  author: &str,
  now: DateTime<Utc>,
) -> Result<Incident> {
  if incident.number != 0 {
    return Err(Error::InvalidValue(format!(
      "new incident must be unnumbered, got #{}",
      incident.number
    )));
  }
  check_user_entries(&incident.report_entries, author)?;

  let blank = Incident::new(incident.event.clone(), incident.created);
  if !blank.state.may_become(incident.state) {
    return Err(Error::EditNotAllowed(format!(
      "new incident cannot start in {}",
      incident.state
    )));
  }
  let delta = incident_delta(&blank, &IncidentEdit::replacing(&incident), author, now)?;

  let mut prepared = blank;
  prepared.created = incident.created.trunc_subsecs(6);
  prepared.report_entries = truncated(std::mem::take(&mut incident.report_entries));
  delta.apply_to(&mut prepared);
  Ok(prepared)
}

fn truncated(entries: Vec<ReportEntry>) -> Vec<ReportEntry> {
  entries
    .into_iter()
    .map(|mut entry| {
      entry.created = entry.created.trunc_subsecs(6);
      entry
    })
    .collect()
}

// ─── Field reports ───────────────────────────────────────────────────────────

/// What a store must persist for one field report edit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldReportDelta {
  summary:        Option<Option<String>>,
  report_entries: Vec<ReportEntry>,
}

impl FieldReportDelta {
  pub fn summary(
    summary: Option<String>,
    author: &str,
    now: DateTime<Utc>,
  ) -> Self {
    let summary = non_blank(summary);
    let text = format!("Changed summary to: {}", show(&summary));
    Self {
      summary:        Some(summary),
      report_entries: vec![ReportEntry::automatic(now, author, text)],
    }
  }

  pub fn user_entries(entries: Vec<ReportEntry>, author: &str) -> Result<Self> {
    check_user_entries(&entries, author)?;
    Ok(Self {
      summary:        None,
      report_entries: truncated(entries),
    })
  }

  /// `Some(value)` when the summary column must be written.
  pub fn new_summary(&self) -> Option<Option<&str>> {
    self.summary.as_ref().map(Option::as_deref)
  }

  pub fn report_entries(&self) -> &[ReportEntry] { &self.report_entries }

  pub fn is_empty(&self) -> bool {
    self.summary.is_none() && self.report_entries.is_empty()
  }

  pub fn apply_to(&self, report: &mut FieldReport) {
    if let Some(summary) = &self.summary {
      report.summary = summary.clone();
    }
    report
      .report_entries
      .extend(self.report_entries.iter().cloned());
    report.report_entries.sort();
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldReportEdit {
  pub number:         Option<u32>,
  pub summary:        Option<Option<String>>,
  pub report_entries: Vec<String>,
}

fn field_report_delta(
  before: &FieldReport,
  edit: &FieldReportEdit,
  author: &str,
  now: DateTime<Utc>,
) -> Result<FieldReportDelta> {
  let mut sentences = Sentences::default();
  let mut delta = FieldReportDelta::default();

  if let Some(summary) = &edit.summary {
    let summary = non_blank(summary.clone());
    if summary != before.summary {
      sentences
        .0
        .push(format!("Changed summary to: {}", show(&summary)));
      delta.summary = Some(summary);
    }
  }

  delta.report_entries.extend(sentences.into_entry(author, now));
  delta
    .report_entries
    .extend(user_entries(&edit.report_entries, author, now)?);
  Ok(delta)
}

pub fn diff_field_report(
  before: &FieldReport,
  edit: &FieldReportEdit,
  author: &str,
  now: DateTime<Utc>,
) -> Result<FieldReportDelta> {
  if let Some(number) = edit.number
    && number != before.number
  {
    return Err(Error::EditNotAllowed(format!(
      "field report number {} cannot be changed to {number}",
      before.number
    )));
  }
  field_report_delta(before, edit, author, now)
}

pub fn prepare_new_field_report(
  mut report: FieldReport,
  author: &str,
  now: DateTime<Utc>,
) -> Result<FieldReport> {
  if report.number != 0 {
    return Err(Error::InvalidValue(format!(
      "new field report must be unnumbered, got #{}",
      report.number
    )));
  }
  check_user_entries(&report.report_entries, author)?;

  let blank = FieldReport::new(report.event.clone(), report.created);
  let edit = FieldReportEdit {
    number:         None,
    summary:        Some(report.summary.clone()),
    report_entries: Vec::new(),
  };
  let delta = field_report_delta(&blank, &edit, author, now)?;

  let mut prepared = blank;
  prepared.created = report.created.trunc_subsecs(6);
  prepared.incident_number = report.incident_number;
  prepared.report_entries = truncated(std::mem::take(&mut report.report_entries));
  delta.apply_to(&mut prepared);
  if let Some(incident_number) = report.incident_number {
    prepared
      .report_entries
      .push(attachment_entry(incident_number, true, author, now));
    prepared.report_entries.sort();
  }
  Ok(prepared)
}

/// The automatic entry recorded on a field report when it is attached to
/// (`attached = true`) or detached from an incident.
pub fn attachment_entry(
  incident_number: u32,
  attached: bool,
  author: &str,
  now: DateTime<Utc>,
) -> ReportEntry {
  let text = if attached {
    format!("Attached to incident: {incident_number}")
  } else {
    format!("Detached from incident: {incident_number}")
  };
  ReportEntry::automatic(now, author, text)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;
  use crate::{
    event::Event,
    incident::IncidentType,
    location::{Location, RodGarettAddress},
  };

  const AUTHOR: &str = "Hubcap";

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  fn incident() -> Incident {
    let mut incident = Incident::new(Event::new("foo"), at(1_000));
    incident.number = 5;
    incident.summary = Some("Lost camper".into());
    incident.ranger_handles = ["Bucket", "Tool"].map(String::from).into();
    incident.incident_types = [IncidentType::JUNK.to_owned()].into();
    incident.location = Location::new(
      Some("Center Camp".into()),
      Some(Address::RodGarett(RodGarettAddress {
        concentric:    Some("1".into()),
        radial_hour:   Some(6),
        radial_minute: Some(0),
        description:   None,
      })),
    );
    incident.report_entries = vec![ReportEntry::new(at(1_000), "Tool", "Camper missing.")];
    incident
  }

  fn automatic_texts(delta: &IncidentDelta) -> Vec<&str> {
    delta
      .report_entries()
      .iter()
      .filter(|e| e.automatic)
      .map(|e| e.text.as_str())
      .collect()
  }

  #[test]
  fn priority_change_yields_one_sentence() {
    let before = incident();
    let edit = IncidentEdit {
      priority: Some(IncidentPriority::High),
      ..Default::default()
    };
    let delta = diff_incident(&before, &edit, AUTHOR, at(2_000)).unwrap();

    assert_eq!(delta.scalar_changes(), &[IncidentChange::Priority(IncidentPriority::High)]);
    assert_eq!(automatic_texts(&delta), vec!["Changed priority to: high"]);
    assert_eq!(delta.report_entries()[0].author, AUTHOR);

    let mut after = before.clone();
    delta.apply_to(&mut after);
    assert_eq!(after.priority, IncidentPriority::High);
    assert_eq!(after.location, before.location);
    assert_eq!(after.summary, before.summary);
    assert_eq!(after.report_entries.len(), before.report_entries.len() + 1);
  }

  #[test]
  fn matching_values_are_a_no_op() {
    let before = incident();
    let edit = IncidentEdit {
      number: Some(5),
      priority: Some(before.priority),
      state: Some(before.state),
      summary: Some(before.summary.clone()),
      location_radial_hour: Some(Some(6)),
      ranger_handles: Some(before.ranger_handles.clone()),
      ..Default::default()
    };
    let delta = diff_incident(&before, &edit, AUTHOR, at(2_000)).unwrap();
    assert!(delta.is_empty());
  }

  #[test]
  fn number_change_is_rejected() {
    let edit = IncidentEdit {
      number: Some(7),
      ..Default::default()
    };
    let err = diff_incident(&incident(), &edit, AUTHOR, at(2_000)).unwrap_err();
    assert!(matches!(err, Error::EditNotAllowed(_)));
  }

  #[test]
  fn on_scene_without_dispatch_is_rejected() {
    let edit = IncidentEdit {
      state: Some(IncidentState::OnScene),
      ..Default::default()
    };
    let err = diff_incident(&incident(), &edit, AUTHOR, at(2_000)).unwrap_err();
    assert!(matches!(err, Error::EditNotAllowed(_)));

    let mut dispatched = incident();
    dispatched.state = IncidentState::Dispatched;
    let delta = diff_incident(&dispatched, &edit, AUTHOR, at(2_000)).unwrap();
    assert_eq!(automatic_texts(&delta), vec!["Changed state to: on_scene"]);
  }

  #[test]
  fn set_changes_report_added_and_removed() {
    let edit = IncidentEdit {
      ranger_handles: Some(["Tool", "Splinter", "Abacus"].map(String::from).into()),
      ..Default::default()
    };
    let delta = diff_incident(&incident(), &edit, AUTHOR, at(2_000)).unwrap();
    assert_eq!(
      automatic_texts(&delta),
      vec!["Added to Rangers: Abacus, Splinter\nRemoved from Rangers: Bucket"]
    );
    assert_eq!(delta.new_ranger_handles().map(BTreeSet::len), Some(3));
    assert!(delta.new_incident_types().is_none());
  }

  #[test]
  fn several_changes_share_one_entry() {
    let edit = IncidentEdit {
      priority: Some(IncidentPriority::Low),
      summary: Some(None),
      location_description: Some(Some("near the man".into())),
      report_entries: vec!["Found them.".into()],
      ..Default::default()
    };
    let delta = diff_incident(&incident(), &edit, AUTHOR, at(2_000)).unwrap();
    assert_eq!(
      automatic_texts(&delta),
      vec![
        "Changed priority to: low\nChanged summary to: \nChanged location \
         description to: near the man"
      ]
    );
    let user: Vec<_> =
      delta.report_entries().iter().filter(|e| !e.automatic).collect();
    assert_eq!(user.len(), 1);
    assert_eq!(user[0].text, "Found them.");
    assert_eq!(user[0].author, AUTHOR);
  }

  #[test]
  fn blank_strings_normalize_to_absent() {
    let mut before = incident();
    before.summary = None;
    let edit = IncidentEdit {
      summary: Some(Some("  ".into())),
      ..Default::default()
    };
    assert!(diff_incident(&before, &edit, AUTHOR, at(2_000)).unwrap().is_empty());
  }

  #[test]
  fn radial_hour_out_of_range_is_invalid() {
    let edit = IncidentEdit {
      location_radial_hour: Some(Some(13)),
      ..Default::default()
    };
    let err = diff_incident(&incident(), &edit, AUTHOR, at(2_000)).unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));
  }

  #[test]
  fn clearing_coordinates_turns_address_into_text() {
    let mut after = incident();
    let edit = IncidentEdit {
      location_concentric: Some(None),
      location_radial_hour: Some(None),
      location_radial_minute: Some(None),
      ..Default::default()
    };
    diff_incident(&after.clone(), &edit, AUTHOR, at(2_000))
      .unwrap()
      .apply_to(&mut after);
    assert!(matches!(after.location.address, Address::TextOnly(_)));
  }

  #[test]
  fn new_incident_gets_creation_entry() {
    let mut new = incident();
    new.number = 0;
    new.report_entries = vec![ReportEntry::new(at(1_000), AUTHOR, "Man overboard!")];
    let prepared = prepare_new_incident(new, AUTHOR, at(1_500)).unwrap();

    let automatic: Vec<_> =
      prepared.report_entries.iter().filter(|e| e.automatic).collect();
    assert_eq!(automatic.len(), 1);
    assert!(automatic[0].text.contains("Changed summary to: Lost camper"));
    assert!(automatic[0].text.contains("Added to Rangers: Bucket, Tool"));
    assert_eq!(prepared.summary.as_deref(), Some("Lost camper"));
    assert_eq!(prepared.ranger_handles.len(), 2);
  }

  #[test]
  fn default_new_incident_has_no_automatic_entry() {
    let mut new = Incident::new(Event::new("foo"), at(1_000));
    new.report_entries = vec![ReportEntry::new(at(1_000), AUTHOR, "Man overboard!")];
    let prepared = prepare_new_incident(new, AUTHOR, at(1_500)).unwrap();
    assert_eq!(prepared.report_entries.len(), 1);
    assert_eq!(prepared.summary_from_report(), Some("Man overboard!"));
  }

  #[test]
  fn new_incident_must_be_unnumbered() {
    let err = prepare_new_incident(incident(), "Tool", at(1_500)).unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));
  }

  #[test]
  fn new_incident_cannot_start_on_scene() {
    let mut new = Incident::new(Event::new("foo"), at(1_000));
    new.state = IncidentState::OnScene;
    let err = prepare_new_incident(new.clone(), AUTHOR, at(1_500)).unwrap_err();
    assert!(matches!(err, Error::EditNotAllowed(_)));

    new.state = IncidentState::Dispatched;
    let prepared = prepare_new_incident(new, AUTHOR, at(1_500)).unwrap();
    assert_eq!(prepared.state, IncidentState::Dispatched);
  }

  #[test]
  fn new_attached_field_report_records_the_attachment() {
    let mut report = FieldReport::new(Event::new("foo"), at(1_000));
    report.incident_number = Some(4);
    let prepared = prepare_new_field_report(report, AUTHOR, at(1_500)).unwrap();
    let texts: Vec<_> =
      prepared.report_entries.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["Attached to incident: 4"]);
    assert!(prepared.report_entries[0].automatic);

    let detached = FieldReport::new(Event::new("foo"), at(1_000));
    let prepared = prepare_new_field_report(detached, AUTHOR, at(1_500)).unwrap();
    assert!(prepared.report_entries.is_empty());
  }

  #[test]
  fn field_report_summary_edit() {
    let mut report = FieldReport::new(Event::new("foo"), at(1_000));
    report.number = 3;
    let edit = FieldReportEdit {
      summary: Some(Some("Ice delivery".into())),
      ..Default::default()
    };
    let delta = diff_field_report(&report, &edit, AUTHOR, at(2_000)).unwrap();
    assert_eq!(delta.new_summary(), Some(Some("Ice delivery")));
    assert_eq!(delta.report_entries()[0].text, "Changed summary to: Ice delivery");

    let renumber = FieldReportEdit {
      number: Some(4),
      ..Default::default()
    };
    assert!(matches!(
      diff_field_report(&report, &renumber, AUTHOR, at(2_000)),
      Err(Error::EditNotAllowed(_))
    ));
  }

  #[test]
  fn user_entry_deltas_are_self_attributed() {
    let entry = ReportEntry::new(at(1_000), "Tool", "hi");
    assert!(IncidentDelta::user_entries(vec![entry.clone()], AUTHOR).is_err());
    assert!(FieldReportDelta::user_entries(vec![entry], "Tool").is_ok());
  }
}
