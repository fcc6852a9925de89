//! Rangers: responders supplied by the external roster.
//!
//! This crate never creates or stores rangers. Incidents refer to them by
//! handle only.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// Roster status. Unknown values read from the roster map to `Other` so a
/// new upstream status never breaks decoding.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Default,
  AsRefStr,
  EnumString,
  Serialize,
  Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RangerStatus {
  Active,
  Inactive,
  Vintage,
  Prospective,
  Alpha,
  Bonked,
  Uberbonked,
  Deceased,
  NonRanger,
  #[default]
  #[serde(other)]
  Other,
}

impl RangerStatus {
  /// Parse a roster status, falling back to [`RangerStatus::Other`].
  pub fn parse(s: &str) -> Self { s.parse().unwrap_or_default() }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ranger {
  /// Unique identifier; incidents store this, not a foreign key.
  pub handle:       String,
  pub name:         String,
  pub status:       RangerStatus,
  pub email:        Vec<String>,
  pub on_site:      bool,
  /// ID of the ranger in the external directory.
  pub directory_id: Option<i64>,
  /// Password hash from the roster, if credentials are cached.
  #[serde(skip_serializing)]
  pub password:     Option<String>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn known_status_parses() {
    assert_eq!(RangerStatus::parse("vintage"), RangerStatus::Vintage);
    assert_eq!(RangerStatus::parse("non_ranger"), RangerStatus::NonRanger);
  }

  #[test]
  fn unknown_status_falls_back_to_other() {
    assert_eq!(RangerStatus::parse("auditor"), RangerStatus::Other);
  }
}
