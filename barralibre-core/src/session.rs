//! The application state: the current document plus the store it lives in.
//!
//! Every mutation is applied to a copy of the document, saved, and only then
//! becomes the current state. A failed save leaves the session as it was.

use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

use crate::catalog::{custom_program_id, parse_program, CatalogError};
use crate::document::{self, DocumentError};
use crate::merge::{merge_with, MergeOptions};
use crate::models::{
    detect_prs, BodyLog, DataGraph, RecordId, Settings, Workout, DEFAULT_PROGRAM,
};
use crate::store::{KeyValueStore, RecordStore, StoreError};
use crate::tombstone::mark_deleted;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Workout not found: {0}")]
    WorkoutNotFound(RecordId),

    #[error("Body log not found: {0}")]
    BodyLogNotFound(RecordId),

    #[error("Custom program not found: {0}")]
    ProgramNotFound(String),

    #[error("Record id {0} belongs to a deleted record")]
    DeletedId(RecordId),

    #[error("Invalid phase {0}: phases start at 1")]
    InvalidPhase(u32),
}

/// A tombstoned id would make the new record vanish on the next merge.
fn reject_deleted(graph: &DataGraph, id: RecordId) -> Result<(), SessionError> {
    if graph.deleted_ids.contains(id) {
        return Err(SessionError::DeletedId(id));
    }
    Ok(())
}

/// Counts of records before and after an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub workouts_before: usize,
    pub workouts_after: usize,
    pub body_logs_before: usize,
    pub body_logs_after: usize,
}

#[derive(Debug)]
pub struct Session<S> {
    store: RecordStore<S>,
    graph: DataGraph,
}

impl<S: KeyValueStore> Session<S> {
    /// Opens a session on whatever the store currently holds.
    pub fn open(store: RecordStore<S>) -> Self {
        let graph = store.load();
        Self { store, graph }
    }

    pub fn graph(&self) -> &DataGraph {
        &self.graph
    }

    pub fn store(&self) -> &RecordStore<S> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RecordStore<S> {
        &mut self.store
    }

    /// Generates an id for a new record.
    pub fn next_id(&self) -> RecordId {
        self.graph.next_id()
    }

    fn apply<T>(
        &mut self,
        mutate: impl FnOnce(&mut DataGraph) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut next = self.graph.clone();
        let out = mutate(&mut next)?;
        self.store.save(&next)?;
        self.graph = next;
        Ok(out)
    }

    /// Adds a workout, recording the personal records it sets.
    pub fn add_workout(&mut self, mut workout: Workout) -> Result<Workout, SessionError> {
        if workout.prs.is_none() {
            let prs = detect_prs(&self.graph.workouts, &workout.exercises);
            if !prs.is_empty() {
                workout.prs = Some(prs);
            }
        }
        let added = workout.clone();
        self.apply(move |graph| {
            reject_deleted(graph, workout.id)?;
            graph.workouts.push(workout);
            Ok(())
        })?;
        tracing::info!("Added workout {}", added.id);
        Ok(added)
    }

    pub fn update_workout(&mut self, workout: Workout) -> Result<(), SessionError> {
        self.apply(|graph| {
            let slot = graph
                .workouts
                .iter_mut()
                .find(|w| w.id == workout.id)
                .ok_or(SessionError::WorkoutNotFound(workout.id))?;
            *slot = workout;
            Ok(())
        })
    }

    /// Deletes a workout and tombstones its id.
    pub fn delete_workout(&mut self, id: RecordId) -> Result<Workout, SessionError> {
        self.apply(|graph| {
            let index = graph
                .workouts
                .iter()
                .position(|w| w.id == id)
                .ok_or(SessionError::WorkoutNotFound(id))?;
            mark_deleted(graph, id);
            Ok(graph.workouts.remove(index))
        })
    }

    pub fn add_body_log(&mut self, log: BodyLog) -> Result<(), SessionError> {
        self.apply(|graph| {
            reject_deleted(graph, log.id)?;
            graph.body_logs.push(log);
            Ok(())
        })
    }

    pub fn update_body_log(&mut self, log: BodyLog) -> Result<(), SessionError> {
        self.apply(|graph| {
            let slot = graph
                .body_logs
                .iter_mut()
                .find(|l| l.id == log.id)
                .ok_or(SessionError::BodyLogNotFound(log.id))?;
            *slot = log;
            Ok(())
        })
    }

    /// Deletes a body log and tombstones its id.
    pub fn delete_body_log(&mut self, id: RecordId) -> Result<BodyLog, SessionError> {
        self.apply(|graph| {
            let index = graph
                .body_logs
                .iter()
                .position(|l| l.id == id)
                .ok_or(SessionError::BodyLogNotFound(id))?;
            mark_deleted(graph, id);
            Ok(graph.body_logs.remove(index))
        })
    }

    pub fn set_phase(&mut self, phase: u32) -> Result<(), SessionError> {
        if phase < 1 {
            return Err(SessionError::InvalidPhase(phase));
        }
        self.apply(|graph| {
            graph.phase = phase;
            Ok(())
        })
    }

    pub fn set_program(&mut self, program: impl Into<String>) -> Result<(), SessionError> {
        let program = program.into();
        self.apply(|graph| {
            graph.program = program;
            Ok(())
        })
    }

    pub fn update_settings(
        &mut self,
        edit: impl FnOnce(&mut Settings),
    ) -> Result<(), SessionError> {
        self.apply(|graph| {
            edit(&mut graph.settings);
            Ok(())
        })
    }

    /// Validates and stores a custom program. Returns its new id.
    pub fn import_program(&mut self, value: Value) -> Result<String, SessionError> {
        let mut program = parse_program(value)?;
        let id = custom_program_id(&program.meta.name, Utc::now().timestamp_millis());
        program.custom_id = Some(id.clone());

        self.apply(|graph| {
            graph.custom_programs.push(program);
            Ok(())
        })?;
        tracing::info!("Imported custom program {}", id);
        Ok(id)
    }

    /// Removes a custom program. The active program falls back to the
    /// default when it was the one removed.
    pub fn remove_program(&mut self, id: &str) -> Result<(), SessionError> {
        self.apply(|graph| {
            let before = graph.custom_programs.len();
            graph
                .custom_programs
                .retain(|p| p.custom_id.as_deref() != Some(id));
            if graph.custom_programs.len() == before {
                return Err(SessionError::ProgramNotFound(id.to_string()));
            }
            if graph.program == id {
                graph.program = DEFAULT_PROGRAM.to_string();
            }
            Ok(())
        })
    }

    /// Merges an exported document into the current one.
    pub fn import_document(&mut self, text: &str) -> Result<ImportSummary, SessionError> {
        let imported = document::parse_snapshot(text)?;
        let merged = merge_with(&self.graph, &imported, MergeOptions::default());

        let summary = ImportSummary {
            workouts_before: self.graph.workouts.len(),
            workouts_after: merged.workouts.len(),
            body_logs_before: self.graph.body_logs.len(),
            body_logs_after: merged.body_logs.len(),
        };
        self.commit(merged)?;
        Ok(summary)
    }

    /// Replaces the current document with `graph` and persists it.
    pub fn commit(&mut self, graph: DataGraph) -> Result<(), SessionError> {
        self.store.save(&graph)?;
        self.graph = graph;
        Ok(())
    }

    /// Deletes all data. The session starts over from the defaults.
    pub fn wipe(&mut self) -> Result<(), SessionError> {
        self.store.wipe()?;
        self.graph = DataGraph::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Exercise, SetEntry};
    use crate::store::MemoryKvStore;
    use chrono::NaiveDate;
    use serde_json::json;

    fn session() -> Session<MemoryKvStore> {
        Session::open(RecordStore::new(MemoryKvStore::new()))
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn squat(kg: &str) -> Vec<Exercise> {
        vec![Exercise::new("Sentadilla", vec![SetEntry::new(kg, "5")])]
    }

    #[test]
    fn test_mutations_are_persisted() {
        let mut session = session();
        session
            .add_workout(Workout::new(RecordId::new(1), date("2025-01-01"), "A", 1))
            .unwrap();
        session.set_phase(2).unwrap();

        let reloaded = session.store().load();
        assert_eq!(&reloaded, session.graph());
        assert_eq!(reloaded.phase, 2);
        assert_eq!(reloaded.workouts.len(), 1);
    }

    #[test]
    fn test_add_workout_records_prs() {
        let mut session = session();
        let first = session
            .add_workout(
                Workout::new(RecordId::new(1), date("2025-01-01"), "A", 1)
                    .with_exercises(squat("60")),
            )
            .unwrap();
        assert_eq!(first.prs.as_ref().unwrap()[0].prev_kg, 0.0);

        let second = session
            .add_workout(
                Workout::new(RecordId::new(2), date("2025-01-02"), "A", 1)
                    .with_exercises(squat("65")),
            )
            .unwrap();
        let pr = &second.prs.unwrap()[0];
        assert_eq!(pr.kg, 65.0);
        assert_eq!(pr.prev_kg, 60.0);

        let third = session
            .add_workout(
                Workout::new(RecordId::new(3), date("2025-01-03"), "A", 1)
                    .with_exercises(squat("50")),
            )
            .unwrap();
        assert!(third.prs.is_none());
    }

    #[test]
    fn test_delete_workout_tombstones_id() {
        let mut session = session();
        session
            .add_workout(Workout::new(RecordId::new(1), date("2025-01-01"), "A", 1))
            .unwrap();
        session.delete_workout(RecordId::new(1)).unwrap();

        let stored = session.store().load();
        assert!(stored.workouts.is_empty());
        assert!(stored.deleted_ids.contains(RecordId::new(1)));
    }

    #[test]
    fn test_delete_missing_record_changes_nothing() {
        let mut session = session();
        assert!(matches!(
            session.delete_workout(RecordId::new(9)),
            Err(SessionError::WorkoutNotFound(_))
        ));
        assert!(matches!(
            session.delete_body_log(RecordId::new(9)),
            Err(SessionError::BodyLogNotFound(_))
        ));
        assert!(session.graph().deleted_ids.is_empty());
        assert!(!session.store().exists());
    }

    #[test]
    fn test_failed_save_keeps_state() {
        let mut session = session();
        session
            .add_workout(Workout::new(RecordId::new(1), date("2025-01-01"), "A", 1))
            .unwrap();

        let duplicate = Workout::new(RecordId::new(1), date("2025-01-02"), "B", 1);
        assert!(session.add_workout(duplicate).is_err());
        assert_eq!(session.graph().workouts.len(), 1);
        assert_eq!(session.store().load().workouts.len(), 1);
    }

    #[test]
    fn test_deleted_id_cannot_be_reused() {
        let mut session = session();
        session
            .add_workout(Workout::new(RecordId::new(1), date("2025-01-01"), "A", 1))
            .unwrap();
        session.delete_workout(RecordId::new(1)).unwrap();

        let again = Workout::new(RecordId::new(1), date("2025-01-02"), "B", 1);
        assert!(matches!(
            session.add_workout(again),
            Err(SessionError::DeletedId(id)) if id == RecordId::new(1)
        ));
        let log = BodyLog::new(RecordId::new(1), date("2025-01-02")).with_measure("peso", 70.0);
        assert!(matches!(session.add_body_log(log), Err(SessionError::DeletedId(_))));

        assert!(session.graph().workouts.is_empty());
        assert!(session.store().load().body_logs.is_empty());
    }

    #[test]
    fn test_records_with_blank_dates_survive_save() {
        let mut session = session();
        session
            .import_document(
                r#"{"phase": "2", "workouts": [{"id": 2, "date": ""}], "bodyLogs": [{"id": 9, "date": ""}]}"#,
            )
            .unwrap();
        session
            .add_workout(Workout::new(RecordId::new(3), date("2025-01-03"), "A", 1))
            .unwrap();

        let stored = session.store().load();
        let ids: Vec<i64> = stored.workouts.iter().map(|w| w.id.as_millis()).collect();
        assert!(ids.contains(&2) && ids.contains(&3));
        assert_eq!(stored.body_logs.len(), 1);
        assert_eq!(stored.workouts.iter().find(|w| w.id == RecordId::new(2)).unwrap().date, None);
    }

    #[test]
    fn test_body_log_lifecycle() {
        let mut session = session();
        let id = session.next_id();
        session
            .add_body_log(BodyLog::new(id, date("2025-01-01")).with_measure("peso", 70.0))
            .unwrap();
        session
            .update_body_log(BodyLog::new(id, date("2025-01-01")).with_measure("peso", 71.5))
            .unwrap();
        assert_eq!(session.graph().body_logs[0].measure("peso"), Some(71.5));

        session.delete_body_log(id).unwrap();
        assert!(session.graph().body_logs.is_empty());
        assert!(session.graph().deleted_ids.contains(id));
    }

    #[test]
    fn test_update_workout() {
        let mut session = session();
        session
            .add_workout(Workout::new(RecordId::new(1), date("2025-01-01"), "A", 1))
            .unwrap();
        session
            .update_workout(
                Workout::new(RecordId::new(1), date("2025-01-01"), "A", 1).with_notes("heavy"),
            )
            .unwrap();
        assert_eq!(session.graph().workouts[0].notes, "heavy");

        let missing = Workout::new(RecordId::new(2), date("2025-01-01"), "A", 1);
        assert!(session.update_workout(missing).is_err());
    }

    #[test]
    fn test_phase_must_be_positive() {
        let mut session = session();
        assert!(matches!(
            session.set_phase(0),
            Err(SessionError::InvalidPhase(0))
        ));
        assert_eq!(session.graph().phase, 1);
    }

    #[test]
    fn test_update_settings() {
        let mut session = session();
        session.update_settings(|s| s.height = 182.0).unwrap();
        assert_eq!(session.store().load().settings.height, 182.0);
        assert_eq!(session.graph().settings.age, 32);
    }

    #[test]
    fn test_import_and_remove_program() {
        let mut session = session();
        let id = session
            .import_program(json!({
                "_meta": { "name": "Mi Plan" },
                "1": { "sessions": { "A": [{ "name": "Dominadas" }] } }
            }))
            .unwrap();
        assert!(id.starts_with("custom_mi-plan_"));
        assert!(session.graph().custom_program(&id).is_some());

        session.set_program(id.clone()).unwrap();
        session.remove_program(&id).unwrap();
        assert!(session.graph().custom_programs.is_empty());
        assert_eq!(session.graph().program, DEFAULT_PROGRAM);

        assert!(matches!(
            session.remove_program(&id),
            Err(SessionError::ProgramNotFound(_))
        ));
    }

    #[test]
    fn test_import_invalid_program_is_rejected() {
        let mut session = session();
        assert!(session.import_program(json!({ "_meta": {} })).is_err());
        assert!(session.graph().custom_programs.is_empty());
    }

    #[test]
    fn test_import_document_merges() {
        let mut session = session();
        session
            .add_workout(Workout::new(RecordId::new(1), date("2025-01-01"), "A", 1))
            .unwrap();

        let summary = session
            .import_document(
                r#"{"phase": 3, "workouts": [{"id": 2, "date": "2025-01-02", "session": "B"}]}"#,
            )
            .unwrap();
        assert_eq!(summary.workouts_before, 1);
        assert_eq!(summary.workouts_after, 2);
        assert_eq!(session.graph().phase, 3);
        assert_eq!(session.store().load().workouts.len(), 2);
    }

    #[test]
    fn test_import_malformed_document_is_rejected() {
        let mut session = session();
        session
            .add_workout(Workout::new(RecordId::new(1), date("2025-01-01"), "A", 1))
            .unwrap();
        let before = session.graph().clone();

        assert!(session.import_document("not json").is_err());
        assert!(session.import_document(r#"{"bodyLogs": []}"#).is_err());
        assert_eq!(session.graph(), &before);
        assert_eq!(session.store().load(), before);
    }

    #[test]
    fn test_wipe_resets_session() {
        let mut session = session();
        session.set_phase(4).unwrap();
        session.wipe().unwrap();
        assert_eq!(session.graph(), &DataGraph::default());
        assert!(!session.store().exists());
    }
}
