//! JSON encoding of the document for local persistence, backups, import and
//! export. All four use the same shape.

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::models::DataGraph;

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("Not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

/// Which sequences a raw document must carry to be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Both `workouts` and `bodyLogs` arrays (the locally persisted document).
    Stored,
    /// A `workouts` array (backups and import files).
    Snapshot,
}

/// Checks the raw structure of a document before it is decoded.
pub fn check_shape(value: &Value, shape: Shape) -> Result<(), DocumentError> {
    let object = value
        .as_object()
        .ok_or_else(|| DocumentError::InvalidDocument("expected a JSON object".to_string()))?;

    let is_array = |key: &str| object.get(key).map(Value::is_array).unwrap_or(false);

    if !is_array("workouts") {
        return Err(DocumentError::InvalidDocument(
            "missing workouts array".to_string(),
        ));
    }
    if shape == Shape::Stored && !is_array("bodyLogs") {
        return Err(DocumentError::InvalidDocument(
            "missing bodyLogs array".to_string(),
        ));
    }
    Ok(())
}

/// Decodes a raw document already known to be JSON.
pub fn decode(value: Value, shape: Shape) -> Result<DataGraph, DocumentError> {
    check_shape(&value, shape)?;
    Ok(serde_json::from_value(value)?)
}

/// Decodes a backup blob or an import file.
pub fn parse_snapshot(text: &str) -> Result<DataGraph, DocumentError> {
    let value: Value = serde_json::from_str(text)?;
    decode(value, Shape::Snapshot)
}

/// Serializes the document the way it is exported and backed up.
pub fn export_json(graph: &DataGraph) -> Result<String, DocumentError> {
    Ok(serde_json::to_string_pretty(graph)?)
}

/// File name offered for an export made on `date`.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("barra-libre-{}.json", date.format("%Y-%m-%d"))
}
