//! Row decoding and column encoding for the PostgreSQL store.
//!
//! Numbers are `bigint`, priorities and radial positions `smallint`, and
//! timestamps `timestamptz`. Rows are read by position because the
//! aggregate columns have no useful names.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ims_core::{
  event::Event,
  field_report::FieldReport,
  incident::{Incident, IncidentPriority, IncidentState},
  location::{Address, Location},
  report_entry::ReportEntry,
};
use sqlx::{FromRow, Row as _, postgres::PgRow};

use crate::{Error, Result};

// ─── Columns ─────────────────────────────────────────────────────────────────

pub fn encode_number(n: u32) -> i64 { i64::from(n) }

pub fn encode_radial(n: Option<u8>) -> Option<i16> { n.map(i16::from) }

pub fn decode_number(n: i64) -> Result<u32> {
  u32::try_from(n).map_err(|_| Error::decode(format!("number {n}")))
}

fn decode_radial(n: Option<i16>) -> Result<Option<u8>> {
  n.map(|n| u8::try_from(n).map_err(|_| Error::decode(format!("radial {n}"))))
    .transpose()
}

pub fn decode_priority(n: i16) -> Result<IncidentPriority> {
  IncidentPriority::from_stored(i64::from(n))
    .ok_or_else(|| Error::decode(format!("priority {n}")))
}

pub fn decode_state(s: &str) -> Result<IncidentState> {
  s.parse()
    .map_err(|_| Error::decode(format!("incident state {s:?}")))
}

// ─── Rows ────────────────────────────────────────────────────────────────────

pub struct RawReportEntry {
  pub owner:     i64,
  pub author:    String,
  pub text:      String,
  pub created:   DateTime<Utc>,
  pub generated: bool,
}

impl FromRow<'_, PgRow> for RawReportEntry {
  fn from_row(row: &PgRow) -> sqlx::Result<Self> {
    Ok(Self {
      owner:     row.try_get(0)?,
      author:    row.try_get(1)?,
      text:      row.try_get(2)?,
      created:   row.try_get(3)?,
      generated: row.try_get(4)?,
    })
  }
}

impl RawReportEntry {
  fn into_entry(self) -> ReportEntry {
    ReportEntry {
      created:   self.created,
      author:    self.author,
      automatic: self.generated,
      text:      self.text,
    }
  }
}

/// Group entry rows by owner number, each list sorted.
pub fn group_entries(
  raws: Vec<RawReportEntry>,
) -> Result<BTreeMap<u32, Vec<ReportEntry>>> {
  let mut grouped: BTreeMap<u32, Vec<ReportEntry>> = BTreeMap::new();
  for raw in raws {
    let owner = decode_number(raw.owner)?;
    grouped.entry(owner).or_default().push(raw.into_entry());
  }
  for entries in grouped.values_mut() {
    entries.sort();
  }
  Ok(grouped)
}

pub struct RawIncident {
  pub number:               i64,
  pub created:              DateTime<Utc>,
  pub priority:             i16,
  pub state:                String,
  pub summary:              Option<String>,
  pub location_name:        Option<String>,
  pub location_concentric:  Option<String>,
  pub radial_hour:          Option<i16>,
  pub radial_minute:        Option<i16>,
  pub location_description: Option<String>,
  pub ranger_handles:       Vec<String>,
  pub incident_types:       Vec<String>,
  pub field_report_numbers: Vec<i64>,
}

impl FromRow<'_, PgRow> for RawIncident {
  fn from_row(row: &PgRow) -> sqlx::Result<Self> {
    Ok(Self {
      number:               row.try_get(0)?,
      created:              row.try_get(1)?,
      priority:             row.try_get(2)?,
      state:                row.try_get(3)?,
      summary:              row.try_get(4)?,
      location_name:        row.try_get(5)?,
      location_concentric:  row.try_get(6)?,
      radial_hour:          row.try_get(7)?,
      radial_minute:        row.try_get(8)?,
      location_description: row.try_get(9)?,
      ranger_handles:       row.try_get(10)?,
      incident_types:       row.try_get(11)?,
      field_report_numbers: row.try_get(12)?,
    })
  }
}

impl RawIncident {
  pub fn into_incident(
    self,
    event: &Event,
    report_entries: Vec<ReportEntry>,
  ) -> Result<Incident> {
    let address = Address::from_columns(
      self.location_concentric,
      decode_radial(self.radial_hour)?,
      decode_radial(self.radial_minute)?,
      self.location_description,
    );

    Ok(Incident {
      event: event.clone(),
      number: decode_number(self.number)?,
      created: self.created,
      state: decode_state(&self.state)?,
      priority: decode_priority(self.priority)?,
      summary: self.summary,
      location: Location::new(self.location_name, Some(address)),
      ranger_handles: self.ranger_handles.into_iter().collect(),
      incident_types: self.incident_types.into_iter().collect(),
      report_entries,
      field_report_numbers: self
        .field_report_numbers
        .into_iter()
        .map(decode_number)
        .collect::<Result<_>>()?,
    })
  }
}

pub struct RawFieldReport {
  pub number:          i64,
  pub created:         DateTime<Utc>,
  pub summary:         Option<String>,
  pub incident_number: Option<i64>,
}

impl FromRow<'_, PgRow> for RawFieldReport {
  fn from_row(row: &PgRow) -> sqlx::Result<Self> {
    Ok(Self {
      number:          row.try_get(0)?,
      created:         row.try_get(1)?,
      summary:         row.try_get(2)?,
      incident_number: row.try_get(3)?,
    })
  }
}

impl RawFieldReport {
  pub fn into_field_report(
    self,
    event: &Event,
    report_entries: Vec<ReportEntry>,
  ) -> Result<FieldReport> {
    Ok(FieldReport {
      event: event.clone(),
      number: decode_number(self.number)?,
      created: self.created,
      summary: self.summary,
      report_entries,
      incident_number: self.incident_number.map(decode_number).transpose()?,
    })
  }
}
