//! Reconciliation of a local and a remote snapshot of the document.
//!
//! Records are matched by id. On collision the remote copy wins, whatever
//! the edit times were. Tombstones from both sides are unioned and every
//! tombstoned id is removed from the result, whichever side contributed
//! the record. Everything that is not a record sequence (program, phase,
//! settings, custom programs, unknown fields) is taken from one side as a
//! whole, by default the remote one.
//!
//! Merging never mutates its inputs and performs no I/O.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::models::{DataGraph, Record};
use crate::tombstone::Tombstones;

/// Which snapshot provides the non-record fields of a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarPolicy {
    /// Take program, phase, settings and custom programs from the remote side.
    #[default]
    Remote,
    /// Keep the local values of those fields.
    Local,
}

impl fmt::Display for ScalarPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarPolicy::Remote => write!(f, "remote"),
            ScalarPolicy::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for ScalarPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "remote" => Ok(ScalarPolicy::Remote),
            "local" => Ok(ScalarPolicy::Local),
            _ => Err(format!(
                "Invalid scalar policy '{}'. Valid options: remote, local",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOptions {
    pub scalars: ScalarPolicy,
}

/// A non-record field whose value differs between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarField {
    Program,
    Phase,
    Settings,
    CustomPrograms,
    Other,
}

impl fmt::Display for ScalarField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarField::Program => write!(f, "program"),
            ScalarField::Phase => write!(f, "phase"),
            ScalarField::Settings => write!(f, "settings"),
            ScalarField::CustomPrograms => write!(f, "custom programs"),
            ScalarField::Other => write!(f, "other fields"),
        }
    }
}

/// Merges `remote` into `local` with the default options (remote scalars).
pub fn merge(local: &DataGraph, remote: &DataGraph) -> DataGraph {
    merge_with(local, remote, MergeOptions::default())
}

pub fn merge_with(local: &DataGraph, remote: &DataGraph, options: MergeOptions) -> DataGraph {
    let deleted = local.deleted_ids.union(&remote.deleted_ids);

    let base = match options.scalars {
        ScalarPolicy::Remote => remote,
        ScalarPolicy::Local => local,
    };

    DataGraph {
        program: base.program.clone(),
        phase: base.phase,
        workouts: merge_by_id(&local.workouts, &remote.workouts, &deleted),
        body_logs: merge_by_id(&local.body_logs, &remote.body_logs, &deleted),
        deleted_ids: deleted,
        settings: base.settings.clone(),
        custom_programs: base.custom_programs.clone(),
        extra: base.extra.clone(),
    }
}

/// Unions two record sequences by id, remote winning, minus tombstones.
///
/// Local records keep their positions (a remote overwrite takes the slot of
/// the local record); remote-only records follow in remote order.
pub fn merge_by_id<R: Record>(local: &[R], remote: &[R], deleted: &Tombstones) -> Vec<R> {
    let mut merged: Vec<R> = Vec::with_capacity(local.len() + remote.len());
    let mut slots: HashMap<_, usize> = HashMap::new();

    for record in local.iter().chain(remote) {
        match slots.get(&record.id()) {
            Some(&slot) => merged[slot] = record.clone(),
            None => {
                slots.insert(record.id(), merged.len());
                merged.push(record.clone());
            }
        }
    }

    merged.retain(|record| !deleted.contains(record.id()));
    merged
}

/// Lists the non-record fields a remote-wins merge would overwrite.
pub fn scalar_changes(local: &DataGraph, remote: &DataGraph) -> Vec<ScalarField> {
    let mut changes = Vec::new();
    if local.program != remote.program {
        changes.push(ScalarField::Program);
    }
    if local.phase != remote.phase {
        changes.push(ScalarField::Phase);
    }
    if local.settings != remote.settings {
        changes.push(ScalarField::Settings);
    }
    if local.custom_programs != remote.custom_programs {
        changes.push(ScalarField::CustomPrograms);
    }
    if local.extra != remote.extra {
        changes.push(ScalarField::Other);
    }
    changes
}
