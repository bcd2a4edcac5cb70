//! Record identity shared by workouts and body logs.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a record: its creation time in milliseconds since the epoch.
///
/// Assigned once when the record is created and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(i64);

impl RecordId {
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns an id based on the current clock that `taken` reports as free.
    pub fn generate(taken: impl Fn(RecordId) -> bool) -> Self {
        let mut id = Self(Utc::now().timestamp_millis());
        while taken(id) {
            id = Self(id.0 + 1);
        }
        id
    }

    pub fn as_millis(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| format!("Invalid record id '{}'", s))
    }
}

impl From<i64> for RecordId {
    fn from(millis: i64) -> Self {
        Self(millis)
    }
}

/// A uniquely identified entry of a mergeable sequence.
pub trait Record: Clone {
    fn id(&self) -> RecordId;
}
