//! Encoding and decoding helpers between domain types and the values stored
//! in SQLite columns.
//!
//! Timestamps are stored as `real` seconds since the Unix epoch at
//! microsecond precision. Set-valued incident attributes arrive as JSON
//! arrays built by `json_group_array`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, SubsecRound as _, Utc};
use ims_core::{
  event::Event,
  field_report::FieldReport,
  incident::{Incident, IncidentPriority, IncidentState},
  location::{Address, Location},
  report_entry::ReportEntry,
};

use crate::{Error, Result};

// ─── Timestamps ──────────────────────────────────────────────────────────────

pub fn encode_time(dt: DateTime<Utc>) -> f64 {
  dt.trunc_subsecs(6).timestamp_micros() as f64 / 1_000_000.0
}

pub fn decode_time(seconds: f64) -> Result<DateTime<Utc>> {
  DateTime::from_timestamp_micros((seconds * 1_000_000.0).round() as i64)
    .ok_or_else(|| Error::decode(format!("timestamp {seconds}")))
}

// ─── Numbers ─────────────────────────────────────────────────────────────────

pub fn decode_number(n: i64) -> Result<u32> {
  u32::try_from(n).map_err(|_| Error::decode(format!("number {n}")))
}

fn decode_radial(n: Option<i64>) -> Result<Option<u8>> {
  n.map(|n| u8::try_from(n).map_err(|_| Error::decode(format!("radial {n}"))))
    .transpose()
}

// ─── Enumerations ────────────────────────────────────────────────────────────

pub fn decode_priority(n: i64) -> Result<IncidentPriority> {
  IncidentPriority::from_stored(n)
    .ok_or_else(|| Error::decode(format!("priority {n}")))
}

pub fn decode_state(s: &str) -> Result<IncidentState> {
  s.parse()
    .map_err(|_| Error::decode(format!("incident state {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// One report entry row, tagged with the number of the incident or field
/// report that owns it.
pub struct RawReportEntry {
  pub owner:     i64,
  pub author:    String,
  pub text:      String,
  pub created:   f64,
  pub generated: bool,
}

impl RawReportEntry {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      owner:     row.get(0)?,
      author:    row.get(1)?,
      text:      row.get(2)?,
      created:   row.get(3)?,
      generated: row.get(4)?,
    })
  }

  pub fn into_entry(self) -> Result<ReportEntry> {
    Ok(ReportEntry {
      created:   decode_time(self.created)?,
      author:    self.author,
      automatic: self.generated,
      text:      self.text,
    })
  }
}

/// Group entry rows by owner number, each list sorted.
pub fn group_entries(
  raws: Vec<RawReportEntry>,
) -> Result<BTreeMap<u32, Vec<ReportEntry>>> {
  let mut grouped: BTreeMap<u32, Vec<ReportEntry>> = BTreeMap::new();
  for raw in raws {
    let owner = decode_number(raw.owner)?;
    grouped.entry(owner).or_default().push(raw.into_entry()?);
  }
  for entries in grouped.values_mut() {
    entries.sort();
  }
  Ok(grouped)
}

/// Columns of one incident row, aggregates still JSON text.
pub struct RawIncident {
  pub number:               i64,
  pub created:              f64,
  pub priority:             i64,
  pub state:                String,
  pub summary:              Option<String>,
  pub location_name:        Option<String>,
  pub location_concentric:  Option<String>,
  pub radial_hour:          Option<i64>,
  pub radial_minute:        Option<i64>,
  pub location_description: Option<String>,
  pub ranger_handles:       String,
  pub incident_types:       String,
  pub field_report_numbers: String,
}

impl RawIncident {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      number:               row.get(0)?,
      created:              row.get(1)?,
      priority:             row.get(2)?,
      state:                row.get(3)?,
      summary:              row.get(4)?,
      location_name:        row.get(5)?,
      location_concentric:  row.get(6)?,
      radial_hour:          row.get(7)?,
      radial_minute:        row.get(8)?,
      location_description: row.get(9)?,
      ranger_handles:       row.get(10)?,
      incident_types:       row.get(11)?,
      field_report_numbers: row.get(12)?,
    })
  }

  pub fn into_incident(
    self,
    event: &Event,
    report_entries: Vec<ReportEntry>,
  ) -> Result<Incident> {
    let ranger_handles: BTreeSet<String> = serde_json::from_str(&self.ranger_handles)?;
    let incident_types: BTreeSet<String> = serde_json::from_str(&self.incident_types)?;
    let field_report_numbers: BTreeSet<u32> =
      serde_json::from_str(&self.field_report_numbers)?;

    let address = Address::from_columns(
      self.location_concentric,
      decode_radial(self.radial_hour)?,
      decode_radial(self.radial_minute)?,
      self.location_description,
    );

    Ok(Incident {
      event: event.clone(),
      number: decode_number(self.number)?,
      created: decode_time(self.created)?,
      state: decode_state(&self.state)?,
      priority: decode_priority(self.priority)?,
      summary: self.summary,
      location: Location::new(self.location_name, Some(address)),
      ranger_handles,
      incident_types,
      report_entries,
      field_report_numbers,
    })
  }
}

pub struct RawFieldReport {
  pub number:          i64,
  pub created:         f64,
  pub summary:         Option<String>,
  pub incident_number: Option<i64>,
}

impl RawFieldReport {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      number:          row.get(0)?,
      created:         row.get(1)?,
      summary:         row.get(2)?,
      incident_number: row.get(3)?,
    })
  }

  pub fn into_field_report(
    self,
    event: &Event,
    report_entries: Vec<ReportEntry>,
  ) -> Result<FieldReport> {
    Ok(FieldReport {
      event: event.clone(),
      number: decode_number(self.number)?,
      created: decode_time(self.created)?,
      summary: self.summary,
      report_entries,
      incident_number: self.incident_number.map(decode_number).transpose()?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn time_survives_real_encoding_at_microseconds() {
    let dt = Utc.timestamp_opt(1_724_155_200, 123_456_000).unwrap();
    assert_eq!(decode_time(encode_time(dt)).unwrap(), dt);

    let sub_micro = Utc.timestamp_opt(1_724_155_200, 123_456_789).unwrap();
    assert_eq!(decode_time(encode_time(sub_micro)).unwrap(), dt);
  }

  #[test]
  fn unknown_state_is_a_decode_error() {
    assert!(matches!(decode_state("lost"), Err(Error::Decode(_))));
    assert_eq!(decode_state("on_hold").unwrap(), IncidentState::OnHold);
  }

  #[test]
  fn negative_number_is_a_decode_error() {
    assert!(decode_number(-1).is_err());
  }
}
