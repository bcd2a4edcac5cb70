//! Program templates: the built-in catalog on disk plus custom programs
//! imported into the document.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::{DataGraph, ExerciseTemplate, ProgramDefinition, Workout};

/// Name of the index file inside a programs directory.
pub const INDEX_FILE: &str = "programs.json";

/// Exercise modes a program may prescribe.
pub const VALID_MODES: &[&str] = &[
    "sets", "result", "interval", "tabata", "rounds", "ladder", "pyramid", "amrap", "emom",
    "superset",
];

const CUSTOM_SLUG_LEN: usize = 30;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("I/O error for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid JSON in {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid program: {0}")]
    InvalidProgram(String),
}

#[derive(Debug, Deserialize)]
struct CatalogIndex {
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
    #[serde(default, rename = "bodyMeasures")]
    body_measures: Vec<BodyMeasure>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    id: String,
    file: String,
}

/// A body measurement the catalog suggests logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BodyMeasure {
    pub id: String,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgramSummary {
    pub id: String,
    pub name: String,
    pub desc: String,
    pub builtin: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub number: u32,
    pub name: String,
    pub desc: String,
}

/// All programs available to the user, keyed by program id.
#[derive(Debug, Clone, Default)]
pub struct ProgramCatalog {
    programs: Vec<(String, ProgramDefinition)>,
    builtin: HashSet<String>,
    body_measures: Vec<BodyMeasure>,
}

impl ProgramCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the built-in programs listed in `<dir>/programs.json`.
    ///
    /// A missing index yields an empty catalog. Program files that cannot be
    /// read or parsed are skipped with a warning.
    pub fn load_dir(dir: &Path) -> Result<Self, CatalogError> {
        let index_path = dir.join(INDEX_FILE);
        let contents = match fs::read_to_string(&index_path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::debug!("No program index at {}", index_path.display());
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(CatalogError::Io {
                    path: index_path,
                    source,
                })
            }
        };

        let index: CatalogIndex =
            serde_json::from_str(&contents).map_err(|source| CatalogError::Parse {
                path: index_path.clone(),
                source,
            })?;

        let mut catalog = Self {
            body_measures: index.body_measures,
            ..Self::default()
        };
        for entry in index.catalog {
            let path = dir.join(&entry.file);
            match read_program(&path) {
                Ok(program) => {
                    catalog.builtin.insert(entry.id.clone());
                    catalog.insert(entry.id, program);
                }
                Err(e) => tracing::warn!("Skipping program '{}': {}", entry.id, e),
            }
        }
        Ok(catalog)
    }

    /// Adds the custom programs stored in the document.
    pub fn with_custom_programs(mut self, graph: &DataGraph) -> Self {
        for program in &graph.custom_programs {
            match &program.custom_id {
                Some(id) => self.insert(id.clone(), program.clone()),
                None => tracing::warn!("Custom program '{}' has no id", program.meta.name),
            }
        }
        self
    }

    fn insert(&mut self, id: String, program: ProgramDefinition) {
        match self.programs.iter_mut().find(|(existing, _)| *existing == id) {
            Some(slot) => slot.1 = program,
            None => self.programs.push((id, program)),
        }
    }

    pub fn get(&self, id: &str) -> Option<&ProgramDefinition> {
        self.programs
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, program)| program)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn is_builtin(&self, id: &str) -> bool {
        self.builtin.contains(id)
    }

    pub fn body_measures(&self) -> &[BodyMeasure] {
        &self.body_measures
    }

    /// Built-in programs in index order, then custom programs.
    pub fn list(&self) -> Vec<ProgramSummary> {
        self.programs
            .iter()
            .map(|(id, program)| ProgramSummary {
                id: id.clone(),
                name: if program.meta.name.is_empty() {
                    id.clone()
                } else {
                    program.meta.name.clone()
                },
                desc: program.meta.desc.clone(),
                builtin: self.is_builtin(id),
            })
            .collect()
    }

    pub fn phases(&self, program: &str) -> Vec<PhaseSummary> {
        let Some(definition) = self.get(program) else {
            return Vec::new();
        };
        definition
            .phase_numbers()
            .into_iter()
            .filter_map(|number| {
                definition.phase(number).map(|phase| PhaseSummary {
                    number,
                    name: phase
                        .name
                        .clone()
                        .unwrap_or_else(|| format!("Fase {}", number)),
                    desc: phase.desc.clone().unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Session names of a phase, in template order.
    pub fn sessions(&self, program: &str, phase: u32) -> Vec<&str> {
        self.get(program)
            .and_then(|definition| definition.phase(phase))
            .map(|phase| phase.sessions.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn session_template(
        &self,
        program: &str,
        phase: u32,
        session: &str,
    ) -> Option<&[ExerciseTemplate]> {
        self.get(program)
            .and_then(|definition| definition.phase(phase))
            .and_then(|phase| phase.sessions.get(session))
            .map(Vec::as_slice)
    }

    /// The session to train next in the active program and phase.
    ///
    /// This is the one following the most recent workout of the active phase,
    /// wrapping around to the first session.
    pub fn next_session(&self, graph: &DataGraph) -> Option<String> {
        let sessions = self.sessions(&graph.program, graph.phase);
        let first = *sessions.first()?;

        let last = graph
            .workouts_by_date()
            .into_iter()
            .filter(|w| w.phase == graph.phase)
            .last();

        let next = match last {
            Some(workout) if sessions.len() > 1 => {
                match sessions.iter().position(|s| *s == workout.session) {
                    Some(index) => sessions[(index + 1) % sessions.len()],
                    None => first,
                }
            }
            _ => first,
        };
        Some(next.to_string())
    }
}

fn read_program(path: &Path) -> Result<ProgramDefinition, CatalogError> {
    let contents = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| CatalogError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Checks that a raw JSON value describes a usable program.
pub fn validate_program(value: &Value) -> Result<(), CatalogError> {
    let invalid = |msg: String| Err(CatalogError::InvalidProgram(msg));

    let Some(object) = value.as_object() else {
        return invalid("not a JSON object".to_string());
    };

    let has_name = object
        .get("_meta")
        .and_then(|meta| meta.get("name"))
        .and_then(Value::as_str)
        .map(|name| !name.is_empty())
        .unwrap_or(false);
    if !has_name {
        return invalid("missing _meta.name".to_string());
    }

    let phases: Vec<(&String, &Value)> = object
        .iter()
        .filter(|(key, _)| key.as_str() != "_meta" && key.as_str() != "_customId")
        .collect();
    if phases.is_empty() {
        return invalid("a program needs at least one phase".to_string());
    }

    for (key, phase) in phases {
        let Some(sessions) = phase.get("sessions").and_then(Value::as_object) else {
            return invalid(format!("phase \"{}\" has no sessions", key));
        };
        for (session, exercises) in sessions {
            let Some(exercises) = exercises.as_array() else {
                return invalid(format!(
                    "session \"{}\" of phase \"{}\" is not an array",
                    session, key
                ));
            };
            for exercise in exercises {
                let Some(name) = exercise.get("name").and_then(Value::as_str) else {
                    return invalid(format!("an exercise in \"{}\" has no name", session));
                };
                if let Some(mode) = exercise.get("mode").and_then(Value::as_str) {
                    if !VALID_MODES.contains(&mode) {
                        return invalid(format!("mode \"{}\" is not valid in \"{}\"", mode, name));
                    }
                }
            }
        }
    }
    Ok(())
}

/// Validates and decodes a program supplied by the user.
pub fn parse_program(value: Value) -> Result<ProgramDefinition, CatalogError> {
    validate_program(&value)?;
    serde_json::from_value(value).map_err(|e| CatalogError::InvalidProgram(e.to_string()))
}

/// Builds the id given to an imported program.
pub fn custom_program_id(name: &str, now_millis: i64) -> String {
    let mut slug = String::new();
    let mut in_separator = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            slug.push(c);
            in_separator = false;
        } else if !in_separator {
            slug.push('-');
            in_separator = true;
        }
    }
    slug.truncate(CUSTOM_SLUG_LEN);
    format!("custom_{}_{}", slug, now_millis)
}

/// The latest workout of `session` in the active phase, used to prefill a
/// new one.
pub fn previous_session<'a>(graph: &'a DataGraph, session: &str) -> Option<&'a Workout> {
    graph
        .workouts_by_date()
        .into_iter()
        .filter(|w| w.session == session && w.phase == graph.phase)
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RecordId;
    use chrono::NaiveDate;
    use serde_json::json;
    use tempfile::TempDir;

    fn program_json(name: &str) -> Value {
        json!({
            "_meta": { "name": name, "desc": "test" },
            "1": {
                "name": "Base",
                "sessions": {
                    "A": [{ "name": "Sentadilla", "sets": 3, "reps": 5 }],
                    "B": [{ "name": "Press", "sets": 3, "reps": "8-10" }],
                    "C": [{ "name": "Burpees", "mode": "amrap" }]
                }
            },
            "2": {
                "sessions": { "A": [{ "name": "Peso muerto" }] }
            }
        })
    }

    fn write_catalog() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join(INDEX_FILE),
            json!({
                "catalog": [
                    { "id": "barraLibre", "file": "barra.json" },
                    { "id": "missing", "file": "missing.json" }
                ],
                "bodyMeasures": [{ "id": "peso", "label": "Peso (kg)" }]
            })
            .to_string(),
        )
        .unwrap();
        fs::write(
            temp_dir.path().join("barra.json"),
            program_json("Barra Libre").to_string(),
        )
        .unwrap();
        temp_dir
    }

    fn workout(id: i64, date: &str, session: &str, phase: u32) -> Workout {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        Workout::new(RecordId::new(id), date, session, phase)
    }

    #[test]
    fn test_load_dir_skips_unreadable_programs() {
        let temp_dir = write_catalog();
        let catalog = ProgramCatalog::load_dir(temp_dir.path()).unwrap();

        let list = catalog.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, "barraLibre");
        assert_eq!(list[0].name, "Barra Libre");
        assert!(list[0].builtin);
        assert_eq!(catalog.body_measures()[0].id, "peso");
    }

    #[test]
    fn test_load_dir_without_index_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let catalog = ProgramCatalog::load_dir(temp_dir.path()).unwrap();
        assert!(catalog.list().is_empty());
    }

    #[test]
    fn test_custom_programs_join_catalog() {
        let temp_dir = write_catalog();
        let mut program = parse_program(program_json("Mio")).unwrap();
        program.custom_id = Some("custom_mio_1".to_string());
        let mut graph = DataGraph::default();
        graph.custom_programs.push(program);

        let catalog = ProgramCatalog::load_dir(temp_dir.path())
            .unwrap()
            .with_custom_programs(&graph);
        let ids: Vec<String> = catalog.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["barraLibre", "custom_mio_1"]);
        assert!(!catalog.is_builtin("custom_mio_1"));
    }

    #[test]
    fn test_phases_and_sessions() {
        let temp_dir = write_catalog();
        let catalog = ProgramCatalog::load_dir(temp_dir.path()).unwrap();

        let phases = catalog.phases("barraLibre");
        assert_eq!(phases.len(), 2);
        assert_eq!(phases[0].name, "Base");
        assert_eq!(phases[1].name, "Fase 2");

        assert_eq!(catalog.sessions("barraLibre", 1), vec!["A", "B", "C"]);
        assert!(catalog.sessions("barraLibre", 9).is_empty());
        assert!(catalog.sessions("nope", 1).is_empty());
        assert_eq!(
            catalog.session_template("barraLibre", 1, "A").unwrap()[0].name,
            "Sentadilla"
        );
    }

    #[test]
    fn test_next_session_wraps_around() {
        let temp_dir = write_catalog();
        let catalog = ProgramCatalog::load_dir(temp_dir.path()).unwrap();
        let mut graph = DataGraph::default();
        graph.program = "barraLibre".to_string();

        assert_eq!(catalog.next_session(&graph).as_deref(), Some("A"));

        graph.workouts.push(workout(2, "2025-01-02", "B", 1));
        graph.workouts.push(workout(1, "2025-01-01", "A", 1));
        assert_eq!(catalog.next_session(&graph).as_deref(), Some("C"));

        graph.workouts.push(workout(3, "2025-01-03", "C", 1));
        assert_eq!(catalog.next_session(&graph).as_deref(), Some("A"));

        // Workouts of another phase are ignored.
        graph.workouts.push(workout(4, "2025-01-04", "A", 2));
        assert_eq!(catalog.next_session(&graph).as_deref(), Some("A"));
    }

    #[test]
    fn test_validate_program() {
        assert!(validate_program(&program_json("Ok")).is_ok());
        assert!(validate_program(&json!([])).is_err());
        assert!(validate_program(&json!({ "1": { "sessions": {} } })).is_err());
        assert!(validate_program(&json!({ "_meta": { "name": "X" } })).is_err());
        assert!(validate_program(&json!({ "_meta": { "name": "X" }, "1": {} })).is_err());
        assert!(validate_program(&json!({
            "_meta": { "name": "X" },
            "1": { "sessions": { "A": {} } }
        }))
        .is_err());
        assert!(validate_program(&json!({
            "_meta": { "name": "X" },
            "1": { "sessions": { "A": [{ "sets": 3 }] } }
        }))
        .is_err());
    }

    #[test]
    fn test_validate_program_rejects_unknown_mode() {
        let err = validate_program(&json!({
            "_meta": { "name": "X" },
            "1": { "sessions": { "A": [{ "name": "Run", "mode": "jog" }] } }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("jog"));
    }

    #[test]
    fn test_custom_program_id() {
        assert_eq!(
            custom_program_id("Mi Programa 5x5!", 1700000000000),
            "custom_mi-programa-5x5-_1700000000000"
        );
        let long = custom_program_id(&"a".repeat(50), 1);
        assert_eq!(long, format!("custom_{}_1", "a".repeat(30)));
    }

    #[test]
    fn test_previous_session() {
        let mut graph = DataGraph::default();
        graph.workouts.push(workout(1, "2025-01-01", "A", 1));
        graph.workouts.push(workout(3, "2025-01-03", "A", 1));
        graph.workouts.push(workout(2, "2025-01-02", "B", 1));
        assert_eq!(
            previous_session(&graph, "A").map(|w| w.id),
            Some(RecordId::new(3))
        );
        assert!(previous_session(&graph, "C").is_none());
    }
}
