use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A training program: metadata plus numbered phases ("1", "2", ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramDefinition {
    #[serde(rename = "_meta")]
    pub meta: ProgramMeta,
    /// Set on programs imported by the user.
    #[serde(rename = "_customId", default, skip_serializing_if = "Option::is_none")]
    pub custom_id: Option<String>,
    #[serde(flatten)]
    pub phases: BTreeMap<String, PhaseTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramMeta {
    pub name: String,
    #[serde(default)]
    pub desc: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    pub sessions: BTreeMap<String, Vec<ExerciseTemplate>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Prescribed exercise within a session template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseTemplate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sets: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reps: Option<Value>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProgramDefinition {
    /// Phase numbers in ascending order. Non-numeric phase keys are skipped.
    pub fn phase_numbers(&self) -> Vec<u32> {
        let mut numbers: Vec<u32> = self.phases.keys().filter_map(|k| k.parse().ok()).collect();
        numbers.sort_unstable();
        numbers
    }

    pub fn phase(&self, number: u32) -> Option<&PhaseTemplate> {
        self.phases.get(&number.to_string())
    }
}
