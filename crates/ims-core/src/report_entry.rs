//! Report entries: the append-only audit trail of incidents and field
//! reports.

use std::cmp::Ordering;

use chrono::{DateTime, SubsecRound as _, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One immutable, timestamped, authored note.
///
/// Entries are only ever appended. `automatic` entries are written by the
/// system to describe changes; callers can never supply one directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportEntry {
  pub created:   DateTime<Utc>,
  pub author:    String,
  pub automatic: bool,
  pub text:      String,
}

impl ReportEntry {
  /// A user-authored entry.
  pub fn new(
    created: DateTime<Utc>,
    author: impl Into<String>,
    text: impl Into<String>,
  ) -> Self {
    Self {
      created:   created.trunc_subsecs(6),
      author:    author.into(),
      automatic: false,
      text:      text.into(),
    }
  }

  pub(crate) fn automatic(
    created: DateTime<Utc>,
    author: &str,
    text: String,
  ) -> Self {
    Self {
      created: created.trunc_subsecs(6),
      author: author.to_owned(),
      automatic: true,
      text,
    }
  }
}

// Ordered by creation time, then author, with automatic entries before
// user entries written at the same instant.
impl Ord for ReportEntry {
  fn cmp(&self, other: &Self) -> Ordering {
    self
      .created
      .cmp(&other.created)
      .then_with(|| self.author.cmp(&other.author))
      .then_with(|| other.automatic.cmp(&self.automatic))
      .then_with(|| self.text.cmp(&other.text))
  }
}

impl PartialOrd for ReportEntry {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

/// The current time at the precision every store persists.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

/// Validate entries a caller wants appended.
///
/// Rejects automatic entries, entries attributed to anyone but `author`, and
/// entries with no text.
pub fn check_user_entries(entries: &[ReportEntry], author: &str) -> Result<()> {
  for entry in entries {
    if entry.automatic {
      return Err(Error::InvalidValue(
        "automatic report entries cannot be supplied by a caller".into(),
      ));
    }
    if entry.author != author {
      return Err(Error::InvalidValue(format!(
        "report entry author {:?} does not match {author:?}",
        entry.author
      )));
    }
    if entry.text.trim().is_empty() {
      return Err(Error::InvalidValue("report entry text is empty".into()));
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn at(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  #[test]
  fn ordering_is_created_author_then_automatic_first() {
    let user = ReportEntry::new(at(10), "Hubcap", "hello");
    let system = ReportEntry::automatic(at(10), "Hubcap", "Changed x".into());
    let earlier = ReportEntry::new(at(5), "Zeke", "first");
    let other_author = ReportEntry::new(at(10), "Abacus", "hi");

    let mut entries = vec![user.clone(), system.clone(), earlier.clone(), other_author.clone()];
    entries.sort();
    assert_eq!(entries, vec![earlier, other_author, system, user]);
  }

  #[test]
  fn user_entries_reject_automatic() {
    let entry = ReportEntry::automatic(at(1), "Hubcap", "sneaky".into());
    let err = check_user_entries(&[entry], "Hubcap").unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));
  }

  #[test]
  fn user_entries_reject_other_author() {
    let entry = ReportEntry::new(at(1), "Bucket", "not mine");
    let err = check_user_entries(&[entry], "Hubcap").unwrap_err();
    assert!(matches!(err, Error::InvalidValue(_)));
  }

  #[test]
  fn user_entries_reject_blank_text() {
    let entry = ReportEntry::new(at(1), "Hubcap", "   ");
    assert!(check_user_entries(&[entry], "Hubcap").is_err());
  }

  #[test]
  fn now_is_microsecond_precision() {
    assert_eq!(now().timestamp_subsec_nanos() % 1_000, 0);
  }
}
