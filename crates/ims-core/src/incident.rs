//! Incidents and their enumerations.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

use crate::{event::Event, location::Location, report_entry::ReportEntry};

// ─── State ───────────────────────────────────────────────────────────────────

/// Progress of an incident: `new → on_hold | dispatched → on_scene → closed`.
///
/// Variants are ordered by an explicit rank rather than declaration order.
/// The string form is what stores persist and what audit entries print.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  AsRefStr,
  Display,
  EnumString,
  Serialize,
  Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
  #[default]
  New,
  OnHold,
  Dispatched,
  OnScene,
  Closed,
}

impl IncidentState {
  pub const ALL: [Self; 5] = [
    Self::New,
    Self::OnHold,
    Self::Dispatched,
    Self::OnScene,
    Self::Closed,
  ];

  pub fn rank(self) -> u8 {
    match self {
      Self::New => 0,
      Self::OnHold => 1,
      Self::Dispatched => 2,
      Self::OnScene => 3,
      Self::Closed => 4,
    }
  }

  /// The state an incident must be in before it can enter `self`.
  pub fn prerequisite(self) -> Option<Self> {
    match self {
      Self::OnScene => Some(Self::Dispatched),
      _ => None,
    }
  }

  /// Whether an incident in `self` may move to `next`.
  ///
  /// Staying put is always allowed. Entering a state with a prerequisite
  /// requires being in that prerequisite now.
  pub fn may_become(self, next: Self) -> bool {
    if self == next {
      return true;
    }
    match next.prerequisite() {
      Some(required) => self == required,
      None => true,
    }
  }
}

impl PartialOrd for IncidentState {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for IncidentState {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.rank().cmp(&other.rank())
  }
}

// ─── Priority ────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  AsRefStr,
  Display,
  EnumString,
  Serialize,
  Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IncidentPriority {
  High,
  #[default]
  Normal,
  Low,
}

impl IncidentPriority {
  pub fn rank(self) -> u8 {
    match self {
      Self::High => 0,
      Self::Normal => 1,
      Self::Low => 2,
    }
  }

  /// The integer stores persist.
  pub fn to_stored(self) -> i16 {
    match self {
      Self::High => 1,
      Self::Normal => 3,
      Self::Low => 5,
    }
  }

  /// Decode a persisted priority. Older data used the full 1–5 scale.
  pub fn from_stored(value: i64) -> Option<Self> {
    match value {
      1 | 2 => Some(Self::High),
      3 => Some(Self::Normal),
      4 | 5 => Some(Self::Low),
      _ => None,
    }
  }
}

impl PartialOrd for IncidentPriority {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for IncidentPriority {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.rank().cmp(&other.rank())
  }
}

// ─── Incident type ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidentType {
  pub name:   String,
  pub hidden: bool,
}

impl IncidentType {
  /// Built-in type for administrative incidents; always present.
  pub const ADMIN: &'static str = "Admin";
  /// Built-in type for incidents filed in error; always present.
  pub const JUNK: &'static str = "Junk";
}

// ─── Incident ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
  pub event:                Event,
  /// Assigned by the store on creation; `0` until then.
  pub number:               u32,
  pub created:              DateTime<Utc>,
  pub state:                IncidentState,
  pub priority:             IncidentPriority,
  pub summary:              Option<String>,
  pub location:             Location,
  pub ranger_handles:       BTreeSet<String>,
  pub incident_types:       BTreeSet<String>,
  pub report_entries:       Vec<ReportEntry>,
  /// Numbers of the field reports attached to this incident.
  pub field_report_numbers: BTreeSet<u32>,
}

impl Incident {
  /// A new, unnumbered incident with default state and priority.
  pub fn new(event: Event, created: DateTime<Utc>) -> Self {
    Self {
      event,
      number: 0,
      created,
      state: IncidentState::default(),
      priority: IncidentPriority::default(),
      summary: None,
      location: Location::default(),
      ranger_handles: BTreeSet::new(),
      incident_types: BTreeSet::new(),
      report_entries: Vec::new(),
      field_report_numbers: BTreeSet::new(),
    }
  }

  /// The summary, or failing that the first line of the first user-written
  /// report entry.
  pub fn summary_from_report(&self) -> Option<&str> {
    summary_from_report(self.summary.as_deref(), &self.report_entries)
  }
}

pub(crate) fn summary_from_report<'a>(
  summary: Option<&'a str>,
  entries: &'a [ReportEntry],
) -> Option<&'a str> {
  if let Some(summary) = summary.filter(|s| !s.is_empty()) {
    return Some(summary);
  }
  entries
    .iter()
    .find(|entry| !entry.automatic)
    .and_then(|entry| entry.text.lines().next())
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn states_order_by_rank() {
    let mut states = IncidentState::ALL.to_vec();
    states.reverse();
    states.sort();
    assert_eq!(states, IncidentState::ALL.to_vec());
    assert!(IncidentState::OnHold < IncidentState::Dispatched);
  }

  #[test]
  fn on_scene_requires_dispatched() {
    assert!(IncidentState::Dispatched.may_become(IncidentState::OnScene));
    assert!(!IncidentState::New.may_become(IncidentState::OnScene));
    assert!(!IncidentState::OnHold.may_become(IncidentState::OnScene));
    assert!(IncidentState::New.may_become(IncidentState::Closed));
    assert!(IncidentState::Closed.may_become(IncidentState::New));
  }

  #[test]
  fn state_strings_match_storage() {
    assert_eq!(IncidentState::OnHold.as_ref(), "on_hold");
    assert_eq!("on_scene".parse::<IncidentState>().unwrap(), IncidentState::OnScene);
  }

  #[test]
  fn priority_storage_scale() {
    assert_eq!(IncidentPriority::from_stored(2), Some(IncidentPriority::High));
    assert_eq!(IncidentPriority::from_stored(4), Some(IncidentPriority::Low));
    assert_eq!(IncidentPriority::from_stored(9), None);
    assert!(IncidentPriority::High < IncidentPriority::Low);
  }

  #[test]
  fn summary_falls_back_to_first_user_entry_line() {
    let created = Utc.timestamp_opt(1_000, 0).unwrap();
    let mut incident = Incident::new(Event::new("foo"), created);
    incident.report_entries = vec![
      ReportEntry::automatic(created, "Hubcap", "Changed state to: new".into()),
      ReportEntry::new(created, "Hubcap", "Man overboard!\nSend a boat."),
    ];
    assert_eq!(incident.summary_from_report(), Some("Man overboard!"));

    incident.summary = Some(String::new());
    assert_eq!(incident.summary_from_report(), Some("Man overboard!"));

    incident.summary = Some("Boat".into());
    assert_eq!(incident.summary_from_report(), Some("Boat"));
  }
}
