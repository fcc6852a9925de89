//! Events: the independent namespaces every other record lives in.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

/// One occurrence of the organization's operations. Incidents, field
/// reports and concentric streets are all scoped to exactly one event.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Event {
  pub id: String,
}

impl Event {
  pub fn new(id: impl Into<String>) -> Self { Self { id: id.into() } }
}

impl fmt::Display for Event {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.id)
  }
}

/// Which kind of access an ACL expression grants on an event.
///
/// The string form is what the `EVENT_ACCESS.MODE` column stores.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  AsRefStr,
  EnumString,
  Serialize,
  Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
  Read,
  Write,
  /// May file field reports but not read incidents.
  Report,
}
