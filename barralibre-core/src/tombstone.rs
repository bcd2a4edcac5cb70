//! Tombstone ledger: ids of deleted records.
//!
//! Deletions are carried inside the document so that a stale copy of a
//! record coming from another device cannot bring it back during a merge.
//! The ledger only grows; entries are never expired.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::models::{DataGraph, RecordId};

/// Set of deleted record ids, serialized as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Tombstones(BTreeSet<RecordId>);

impl Tombstones {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an id. Returns false if it was already present.
    pub fn insert(&mut self, id: RecordId) -> bool {
        self.0.insert(id)
    }

    pub fn contains(&self, id: RecordId) -> bool {
        self.0.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RecordId> + '_ {
        self.0.iter().copied()
    }

    /// Both ledgers combined, without duplicates.
    pub fn union(&self, other: &Tombstones) -> Tombstones {
        Tombstones(self.0.union(&other.0).copied().collect())
    }
}

impl FromIterator<RecordId> for Tombstones {
    fn from_iter<I: IntoIterator<Item = RecordId>>(iter: I) -> Self {
        Tombstones(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for Tombstones {
    /// Accepts a missing/`null` ledger and skips entries that are not integers.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let values: Option<Vec<Value>> = Option::deserialize(deserializer)?;
        Ok(values
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_i64)
            .map(RecordId::new)
            .collect())
    }
}

/// Records the deletion of `id` in the graph's ledger. Idempotent.
///
/// Must be called before the deleting mutation is saved so that the saved
/// document always carries its own tombstones.
pub fn mark_deleted(graph: &mut DataGraph, id: RecordId) {
    if !graph.deleted_ids.insert(id) {
        tracing::debug!("Record {} already tombstoned", id);
    }
}
