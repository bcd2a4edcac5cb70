use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::lenient::{as_text, take_field, take_id, take_list, take_text, take_u32};
use super::record::{Record, RecordId};

/// A logged training session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "Map<String, Value>")]
pub struct Workout {
    pub id: RecordId,
    /// `None` when the stored date is missing or unreadable. An unreadable
    /// value is kept in `extra`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub session: String,
    pub phase: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    pub notes: String,
    pub exercises: Vec<Exercise>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prs: Option<Vec<PersonalRecord>>,
    /// Fields written by other versions of the app.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One exercise of a workout with the sets performed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Exercise {
    pub name: String,
    pub sets: Vec<SetEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A set as typed by the user: weight and reps are free text ("65", "2min").
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SetEntry {
    #[serde(default, deserialize_with = "text_or_number")]
    pub kg: String,
    #[serde(default, deserialize_with = "text_or_number")]
    pub reps: String,
}

/// A personal record reached in a workout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalRecord {
    pub exercise: String,
    pub kg: f64,
    #[serde(default)]
    pub prev_kg: f64,
}

const DEFAULT_WORKOUT_PHASE: u32 = 1;

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Value>::deserialize(deserializer)?
        .as_ref()
        .and_then(as_text)
        .unwrap_or_default())
}

impl TryFrom<Map<String, Value>> for Workout {
    type Error = String;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: take_id(&mut map)?,
            date: take_field(&mut map, "date"),
            session: take_text(&mut map, "session").unwrap_or_default(),
            phase: take_u32(&mut map, "phase").unwrap_or(DEFAULT_WORKOUT_PHASE),
            program: take_field(&mut map, "program"),
            notes: take_text(&mut map, "notes").unwrap_or_default(),
            exercises: take_list(&mut map, "exercises"),
            prs: take_field(&mut map, "prs"),
            extra: map,
        })
    }
}

impl TryFrom<Map<String, Value>> for Exercise {
    type Error = String;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        Ok(Self {
            name: take_text(&mut map, "name").unwrap_or_default(),
            sets: take_list(&mut map, "sets"),
            extra: map,
        })
    }
}

impl Workout {
    pub fn new(id: RecordId, date: NaiveDate, session: impl Into<String>, phase: u32) -> Self {
        Self {
            id,
            date: Some(date),
            session: session.into(),
            phase,
            program: None,
            notes: String::new(),
            exercises: Vec::new(),
            prs: None,
            extra: Map::new(),
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn with_exercises(mut self, exercises: Vec<Exercise>) -> Self {
        self.exercises = exercises;
        self
    }

    /// The date for display, or a placeholder when there is none.
    pub fn date_label(&self) -> String {
        date_label(self.date)
    }

    /// Heaviest weight lifted for `exercise` in this workout, 0 when none.
    pub fn max_kg(&self, exercise: &str) -> f64 {
        self.exercises
            .iter()
            .filter(|e| e.name == exercise)
            .map(Exercise::max_kg)
            .fold(0.0, f64::max)
    }

    /// Total weight moved (kg x reps over every set with numeric values).
    pub fn volume(&self) -> f64 {
        self.exercises
            .iter()
            .flat_map(|e| e.sets.iter())
            .map(|s| s.weight().unwrap_or(0.0) * s.rep_count().unwrap_or(0) as f64)
            .sum()
    }
}

impl Record for Workout {
    fn id(&self) -> RecordId {
        self.id
    }
}

impl Exercise {
    pub fn new(name: impl Into<String>, sets: Vec<SetEntry>) -> Self {
        Self {
            name: name.into(),
            sets,
            extra: Map::new(),
        }
    }

    pub fn max_kg(&self) -> f64 {
        self.sets
            .iter()
            .filter_map(SetEntry::weight)
            .fold(0.0, f64::max)
    }
}

impl SetEntry {
    pub fn new(kg: impl Into<String>, reps: impl Into<String>) -> Self {
        Self {
            kg: kg.into(),
            reps: reps.into(),
        }
    }

    /// Weight as a number, if the text is one.
    pub fn weight(&self) -> Option<f64> {
        self.kg
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|kg| kg.is_finite() && *kg > 0.0)
    }

    /// Repetitions as a number, if the text starts with one.
    pub fn rep_count(&self) -> Option<u32> {
        let digits: String = self
            .reps
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .collect();
        digits.parse().ok()
    }
}

pub(crate) fn date_label(date: Option<NaiveDate>) -> String {
    date.map_or_else(|| "(no date)".to_string(), |d| d.to_string())
}

/// Lists the exercises of `exercises` whose best weight beats every earlier
/// workout in `history`.
pub fn detect_prs<'a>(
    history: impl IntoIterator<Item = &'a Workout> + Clone,
    exercises: &[Exercise],
) -> Vec<PersonalRecord> {
    exercises
        .iter()
        .filter_map(|exercise| {
            let max = exercise.max_kg();
            if max <= 0.0 {
                return None;
            }
            let previous = history
                .clone()
                .into_iter()
                .map(|w| w.max_kg(&exercise.name))
                .fold(0.0, f64::max);
            (max > previous).then(|| PersonalRecord {
                exercise: exercise.name.clone(),
                kg: max,
                prev_kg: previous,
            })
        })
        .collect()
}

impl fmt::Display for Workout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} - {} (phase {})", self.date_label(), self.session, self.phase)?;
        writeln!(f, "{}", "=".repeat(30))?;
        writeln!(f, "ID: {}", self.id)?;

        for exercise in &self.exercises {
            let sets: Vec<String> = exercise
                .sets
                .iter()
                .map(|s| {
                    let kg = if s.kg.is_empty() { "-" } else { &s.kg };
                    let reps = if s.reps.is_empty() { "-" } else { &s.reps };
                    format!("{}x{}", kg, reps)
                })
                .collect();
            writeln!(f, "  {}: {}", exercise.name, sets.join(", "))?;
        }

        if let Some(prs) = &self.prs {
            for pr in prs {
                writeln!(f, "  PR {}: {}kg (was {}kg)", pr.exercise, pr.kg, pr.prev_kg)?;
            }
        }

        if !self.notes.is_empty() {
            writeln!(f, "\nNotes: {}", self.notes)?;
        }

        Ok(())
    }
}
