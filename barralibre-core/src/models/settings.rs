use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient::{as_f64, as_u32, discard};

pub const DEFAULT_HEIGHT_CM: f64 = 175.0;
pub const DEFAULT_AGE: u32 = 32;

/// Personal settings used by the calculators.
///
/// Any stored value decodes; unreadable entries take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value")]
pub struct Settings {
    pub height: f64,
    pub age: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<Value> for Settings {
    fn from(value: Value) -> Self {
        let mut extra = match value {
            Value::Object(map) => map,
            other => {
                discard::<()>("settings", &other);
                return Self::default();
            }
        };
        let height = extra
            .remove("height")
            .and_then(|v| as_f64(&v).or_else(|| discard("height", &v)));
        let age = extra
            .remove("age")
            .and_then(|v| as_u32(&v).or_else(|| discard("age", &v)));
        Self {
            height: height.unwrap_or(DEFAULT_HEIGHT_CM),
            age: age.unwrap_or(DEFAULT_AGE),
            extra,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            height: DEFAULT_HEIGHT_CM,
            age: DEFAULT_AGE,
            extra: Map::new(),
        }
    }
}
