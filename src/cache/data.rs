//! Expiring cache entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached payload and the instant it stops being served.
///
/// Validity is judged when the entry is read, so the same stored bytes go
/// from valid to expired without anyone touching them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageData {
  pub valid_until: DateTime<Utc>,
  #[serde(with = "hex::serde")]
  pub data: Vec<u8>,
}

impl StorageData {
  pub fn new(valid_until: DateTime<Utc>, data: impl Into<Vec<u8>>) -> Self {
    Self {
      valid_until,
      data: data.into(),
    }
  }

  /// Whether the entry may still be served right now.
  pub fn is_valid(&self) -> bool {
    self.is_valid_at(Utc::now())
  }

  pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
    now <= self.valid_until
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn test_validity_is_inclusive() {
    let now = Utc::now();
    let entry = StorageData::new(now, b"x".to_vec());
    assert!(entry.is_valid_at(now));
    assert!(entry.is_valid_at(now - Duration::seconds(1)));
    assert!(!entry.is_valid_at(now + Duration::milliseconds(1)));
  }

  #[test]
  fn test_validity_follows_the_clock() {
    let future = StorageData::new(Utc::now() + Duration::hours(1), Vec::new());
    let past = StorageData::new(Utc::now() - Duration::hours(1), Vec::new());
    assert!(future.is_valid());
    assert!(!past.is_valid());
  }
}
