use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::body_log::BodyLog;
use super::lenient::{as_text, as_u32, discard, lenient_records};
use super::program::ProgramDefinition;
use super::record::{Record, RecordId};
use super::settings::Settings;
use super::workout::Workout;
use crate::tombstone::Tombstones;

/// Program id used when no program has been chosen.
pub const DEFAULT_PROGRAM: &str = "default";
pub const DEFAULT_PHASE: u32 = 1;

/// The whole user document: records, tombstones and settings.
///
/// This is both the locally persisted document and the backup blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataGraph {
    #[serde(default = "default_program", deserialize_with = "lenient_program")]
    pub program: String,
    #[serde(default = "default_phase", deserialize_with = "lenient_phase")]
    pub phase: u32,
    #[serde(default, deserialize_with = "lenient_records")]
    pub workouts: Vec<Workout>,
    #[serde(default, deserialize_with = "lenient_records")]
    pub body_logs: Vec<BodyLog>,
    #[serde(default)]
    pub deleted_ids: Tombstones,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default, deserialize_with = "lenient_programs")]
    pub custom_programs: Vec<ProgramDefinition>,
    /// Top-level fields unknown to this version, kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_program() -> String {
    DEFAULT_PROGRAM.to_string()
}

fn default_phase() -> u32 {
    DEFAULT_PHASE
}

fn lenient_program<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(as_text(&value)
        .filter(|id| !id.is_empty())
        .or_else(|| discard("program", &value))
        .unwrap_or_else(default_program))
}

fn lenient_phase<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(as_u32(&value)
        .or_else(|| discard("phase", &value))
        .unwrap_or(DEFAULT_PHASE))
}

fn lenient_programs<'de, D>(deserializer: D) -> Result<Vec<ProgramDefinition>, D::Error>
where
    D: Deserializer<'de>,
{
    let values: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(program) => Some(program),
            Err(e) => {
                tracing::warn!("Dropping malformed custom program: {}", e);
                None
            }
        })
        .collect())
}

impl Default for DataGraph {
    fn default() -> Self {
        Self {
            program: default_program(),
            phase: DEFAULT_PHASE,
            workouts: Vec::new(),
            body_logs: Vec::new(),
            deleted_ids: Tombstones::new(),
            settings: Settings::default(),
            custom_programs: Vec::new(),
            extra: Map::new(),
        }
    }
}

impl DataGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn workout(&self, id: RecordId) -> Option<&Workout> {
        self.workouts.iter().find(|w| w.id == id)
    }

    pub fn body_log(&self, id: RecordId) -> Option<&BodyLog> {
        self.body_logs.iter().find(|l| l.id == id)
    }

    /// Generates an id not used by any record or tombstone.
    pub fn next_id(&self) -> RecordId {
        RecordId::generate(|id| self.is_known_id(id))
    }

    fn is_known_id(&self, id: RecordId) -> bool {
        self.deleted_ids.contains(id)
            || self.workouts.iter().any(|w| w.id == id)
            || self.body_logs.iter().any(|l| l.id == id)
    }

    /// Returns the first id that occurs twice in either sequence.
    pub fn duplicate_id(&self) -> Option<RecordId> {
        first_duplicate(&self.workouts).or_else(|| first_duplicate(&self.body_logs))
    }

    /// Workouts sorted by date, oldest first. Stored order is not meaningful.
    pub fn workouts_by_date(&self) -> Vec<&Workout> {
        let mut workouts: Vec<&Workout> = self.workouts.iter().collect();
        workouts.sort_by_key(|w| (w.date, w.id));
        workouts
    }

    pub fn body_logs_by_date(&self) -> Vec<&BodyLog> {
        let mut logs: Vec<&BodyLog> = self.body_logs.iter().collect();
        logs.sort_by_key(|l| (l.date, l.id));
        logs
    }

    pub fn custom_program(&self, id: &str) -> Option<&ProgramDefinition> {
        self.custom_programs
            .iter()
            .find(|p| p.custom_id.as_deref() == Some(id))
    }
}

fn first_duplicate<R: Record>(records: &[R]) -> Option<RecordId> {
    let mut seen = std::collections::HashSet::new();
    records.iter().map(Record::id).find(|id| !seen.insert(*id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn test_default_graph() {
        let graph = DataGraph::default();
        assert_eq!(graph.program, "default");
        assert_eq!(graph.phase, 1);
        assert!(graph.workouts.is_empty());
        assert!(graph.body_logs.is_empty());
        assert!(graph.deleted_ids.is_empty());
        assert_eq!(graph.settings, Settings::default());
    }

    #[test]
    fn test_field_names_match_document_format() {
        let value = serde_json::to_value(DataGraph::default()).unwrap();
        let object = value.as_object().unwrap();
        for key in [
            "program",
            "phase",
            "workouts",
            "bodyLogs",
            "deletedIds",
            "settings",
            "customPrograms",
        ] {
            assert!(object.contains_key(key), "missing {}", key);
        }
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let graph: DataGraph =
            serde_json::from_value(json!({ "workouts": [{ "id": 2, "date": "2025-01-02" }] }))
                .unwrap();
        assert_eq!(graph.phase, 1);
        assert_eq!(graph.workouts.len(), 1);
        assert!(graph.body_logs.is_empty());
        assert!(graph.deleted_ids.is_empty());
    }

    #[test]
    fn test_records_without_id_are_dropped() {
        let graph: DataGraph = serde_json::from_value(json!({
            "workouts": [
                { "date": "2025-01-01", "session": "A" },
                { "id": 3, "date": "2025-01-03" },
                { "id": "x", "date": "2025-01-04" }
            ],
            "bodyLogs": [{ "peso": 70 }]
        }))
        .unwrap();
        assert_eq!(graph.workouts.len(), 1);
        assert_eq!(graph.workouts[0].id, RecordId::new(3));
        assert!(graph.body_logs.is_empty());
    }

    #[test]
    fn test_records_with_unreadable_fields_are_kept() {
        let graph: DataGraph = serde_json::from_value(json!({
            "workouts": [{ "id": 2, "date": "" }, { "id": 4, "date": "2025-01-04", "phase": "x" }],
            "bodyLogs": [{ "id": 9, "date": "" }]
        }))
        .unwrap();
        let ids: Vec<i64> = graph.workouts.iter().map(|w| w.id.as_millis()).collect();
        assert_eq!(ids, vec![2, 4]);
        assert_eq!(graph.workouts[1].phase, 1);
        assert_eq!(graph.body_logs.len(), 1);
        assert_eq!(graph.body_logs[0].id, RecordId::new(9));
    }

    #[test]
    fn test_scalars_written_as_text() {
        let graph: DataGraph = serde_json::from_value(json!({
            "program": 3,
            "phase": "2",
            "settings": { "height": "180", "age": "40" },
            "workouts": [{ "id": 1, "date": "2025-01-01" }],
            "bodyLogs": []
        }))
        .unwrap();
        assert_eq!(graph.program, "3");
        assert_eq!(graph.phase, 2);
        assert_eq!(graph.settings.height, 180.0);
        assert_eq!(graph.settings.age, 40);
        assert_eq!(graph.workouts.len(), 1);

        let fallback: DataGraph = serde_json::from_value(json!({
            "program": null,
            "phase": "dos",
            "settings": "none",
            "workouts": [],
            "bodyLogs": []
        }))
        .unwrap();
        assert_eq!(fallback.program, DEFAULT_PROGRAM);
        assert_eq!(fallback.phase, DEFAULT_PHASE);
        assert_eq!(fallback.settings, Settings::default());
    }

    #[test]
    fn test_unknown_top_level_fields_pass_through() {
        let graph: DataGraph =
            serde_json::from_value(json!({ "workouts": [], "bodyLogs": [], "theme": "dark" }))
                .unwrap();
        assert_eq!(graph.extra.get("theme"), Some(&json!("dark")));
        let back = serde_json::to_value(&graph).unwrap();
        assert_eq!(back["theme"], json!("dark"));
    }

    #[test]
    fn test_next_id_avoids_tombstones_and_records() {
        let mut graph = DataGraph::default();
        let first = graph.next_id();
        graph.deleted_ids.insert(first);
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        graph
            .workouts
            .push(Workout::new(RecordId::new(first.as_millis() + 1), date, "A", 1));
        let next = graph.next_id();
        assert!(next.as_millis() >= first.as_millis() + 2);
    }

    #[test]
    fn test_duplicate_id() {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let mut graph = DataGraph::default();
        graph.workouts.push(Workout::new(RecordId::new(1), date, "A", 1));
        assert_eq!(graph.duplicate_id(), None);
        graph.workouts.push(Workout::new(RecordId::new(1), date, "B", 1));
        assert_eq!(graph.duplicate_id(), Some(RecordId::new(1)));
    }

    #[test]
    fn test_workouts_by_date() {
        let mut graph = DataGraph::default();
        let d = |s: &str| NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap();
        graph.workouts.push(Workout::new(RecordId::new(2), d("2025-02-01"), "B", 1));
        graph.workouts.push(Workout::new(RecordId::new(1), d("2025-01-01"), "A", 1));
        let sorted: Vec<i64> = graph
            .workouts_by_date()
            .iter()
            .map(|w| w.id.as_millis())
            .collect();
        assert_eq!(sorted, vec![1, 2]);
    }
}
