use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

use super::lenient::{take_field, take_id};
use super::record::{Record, RecordId};
use super::workout::date_label;

/// Keys of a body log that are not measurements.
pub const RESERVED_KEYS: [&str; 2] = ["id", "date"];

/// A dated set of body measurements (weight, body fat, girths).
///
/// Measurements are stored flat next to `id` and `date`, keyed by measure
/// name, e.g. `{"id": 1, "date": "2025-01-01", "peso": 70.5, "biceps": 36}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct BodyLog {
    pub id: RecordId,
    /// `None` when the stored date is missing or unreadable. An unreadable
    /// value stays in `measures` under `date`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(flatten)]
    pub measures: Map<String, Value>,
}

impl TryFrom<Map<String, Value>> for BodyLog {
    type Error = String;

    fn try_from(mut map: Map<String, Value>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: take_id(&mut map)?,
            date: take_field(&mut map, "date"),
            measures: map,
        })
    }
}

/// Whether `name` can be used as a measurement key.
pub fn is_measure_name(name: &str) -> bool {
    !name.trim().is_empty() && !RESERVED_KEYS.contains(&name)
}

impl BodyLog {
    pub fn new(id: RecordId, date: NaiveDate) -> Self {
        Self {
            id,
            date: Some(date),
            measures: Map::new(),
        }
    }

    pub fn with_measure(mut self, name: impl Into<String>, value: f64) -> Self {
        self.set_measure(name, value);
        self
    }

    /// Sets a measurement. Returns false, storing nothing, for a non-finite
    /// value or a reserved key.
    pub fn set_measure(&mut self, name: impl Into<String>, value: f64) -> bool {
        let name = name.into();
        if !is_measure_name(&name) {
            return false;
        }
        match Number::from_f64(value) {
            Some(number) => {
                self.measures.insert(name, Value::Number(number));
                true
            }
            None => false,
        }
    }

    pub fn measure(&self, name: &str) -> Option<f64> {
        self.numeric_measures()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    /// Numeric measurements in stored order.
    pub fn numeric_measures(&self) -> impl Iterator<Item = (&str, f64)> {
        self.measures
            .iter()
            .filter(|(k, _)| is_measure_name(k))
            .filter_map(|(k, v)| v.as_f64().map(|n| (k.as_str(), n)))
    }

    pub fn is_empty(&self) -> bool {
        self.numeric_measures().next().is_none()
    }

    pub fn date_label(&self) -> String {
        date_label(self.date)
    }
}

impl Record for BodyLog {
    fn id(&self) -> RecordId {
        self.id
    }
}

impl fmt::Display for BodyLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values: Vec<String> = self
            .numeric_measures()
            .map(|(name, value)| format!("{}: {}", name, value))
            .collect();
        write!(f, "{} [{}] {}", self.date_label(), self.id, values.join(" · "))
    }
}
