//! Field reports: standalone reports that may be attached to an incident.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{event::Event, incident::summary_from_report, report_entry::ReportEntry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldReport {
  pub event:           Event,
  /// Assigned by the store from a store-wide sequence; `0` until then.
  pub number:          u32,
  pub created:         DateTime<Utc>,
  pub summary:         Option<String>,
  pub report_entries:  Vec<ReportEntry>,
  /// The incident this report is attached to, if any.
  pub incident_number: Option<u32>,
}

impl FieldReport {
  pub fn new(event: Event, created: DateTime<Utc>) -> Self {
    Self {
      event,
      number: 0,
      created,
      summary: None,
      report_entries: Vec::new(),
      incident_number: None,
    }
  }

  pub fn summary_from_report(&self) -> Option<&str> {
    summary_from_report(self.summary.as_deref(), &self.report_entries)
  }

  pub fn is_detached(&self) -> bool { self.incident_number.is_none() }
}
