//! Incident locations.
//!
//! An address is either free text or a concentric/radial coordinate (a ring
//! street plus a clock position). The variant is reconstructed from the
//! stored columns on read: no coordinates means free text.

use serde::{Deserialize, Serialize};

/// An address described only in prose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextOnlyAddress {
  pub description: Option<String>,
}

/// An address on the concentric/radial grid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RodGarettAddress {
  /// Concentric street ID, scoped to the incident's event.
  pub concentric:    Option<String>,
  pub radial_hour:   Option<u8>,
  pub radial_minute: Option<u8>,
  pub description:   Option<String>,
}

impl RodGarettAddress {
  fn has_coordinates(&self) -> bool {
    self.concentric.is_some()
      || self.radial_hour.is_some()
      || self.radial_minute.is_some()
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Address {
  TextOnly(TextOnlyAddress),
  RodGarett(RodGarettAddress),
}

impl Default for Address {
  fn default() -> Self { Self::TextOnly(TextOnlyAddress::default()) }
}

impl Address {
  /// Build an address from the flat column values a store persists.
  pub fn from_columns(
    concentric: Option<String>,
    radial_hour: Option<u8>,
    radial_minute: Option<u8>,
    description: Option<String>,
  ) -> Self {
    let address = RodGarettAddress {
      concentric,
      radial_hour,
      radial_minute,
      description,
    };
    if address.has_coordinates() {
      Self::RodGarett(address)
    } else {
      Self::TextOnly(TextOnlyAddress {
        description: address.description,
      })
    }
  }

  pub fn concentric(&self) -> Option<&str> {
    match self {
      Self::TextOnly(_) => None,
      Self::RodGarett(a) => a.concentric.as_deref(),
    }
  }

  pub fn radial_hour(&self) -> Option<u8> {
    match self {
      Self::TextOnly(_) => None,
      Self::RodGarett(a) => a.radial_hour,
    }
  }

  pub fn radial_minute(&self) -> Option<u8> {
    match self {
      Self::TextOnly(_) => None,
      Self::RodGarett(a) => a.radial_minute,
    }
  }

  pub fn description(&self) -> Option<&str> {
    match self {
      Self::TextOnly(a) => a.description.as_deref(),
      Self::RodGarett(a) => a.description.as_deref(),
    }
  }

  /// Compare two addresses across variants.
  ///
  /// A grid address with no coordinates set is equivalent to a text-only
  /// address with the same description.
  pub fn equivalent(&self, other: &Self) -> bool {
    self.concentric() == other.concentric()
      && self.radial_hour() == other.radial_hour()
      && self.radial_minute() == other.radial_minute()
      && self.description() == other.description()
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
  pub name:    Option<String>,
  pub address: Address,
}

impl Location {
  /// A missing address normalizes to an empty text-only address.
  pub fn new(name: Option<String>, address: Option<Address>) -> Self {
    Self {
      name,
      address: address.unwrap_or_default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn missing_address_normalizes_to_text_only() {
    let location = Location::new(Some("Camp".into()), None);
    assert_eq!(location.address, Address::TextOnly(TextOnlyAddress::default()));
  }

  #[test]
  fn empty_grid_address_is_equivalent_to_text() {
    let grid = Address::RodGarett(RodGarettAddress {
      description: Some("by the tree".into()),
      ..Default::default()
    });
    let text = Address::TextOnly(TextOnlyAddress {
      description: Some("by the tree".into()),
    });
    assert!(grid.equivalent(&text));
    assert!(text.equivalent(&grid));
    assert_ne!(grid, text);
  }

  #[test]
  fn grid_address_with_coordinates_is_not_equivalent_to_text() {
    let grid = Address::RodGarett(RodGarettAddress {
      radial_hour: Some(9),
      description: Some("by the tree".into()),
      ..Default::default()
    });
    let text = Address::TextOnly(TextOnlyAddress {
      description: Some("by the tree".into()),
    });
    assert!(!grid.equivalent(&text));
  }

  #[test]
  fn from_columns_picks_variant() {
    assert!(matches!(
      Address::from_columns(None, None, None, Some("x".into())),
      Address::TextOnly(_)
    ));
    assert!(matches!(
      Address::from_columns(Some("1".into()), None, None, None),
      Address::RodGarett(_)
    ));
  }
}
