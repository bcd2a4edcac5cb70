use serde_json::Value;
use std::fmt;
use thiserror::Error;

use super::kv::{KeyValueStore, KvError};
use crate::document::{self, DocumentError, Shape};
use crate::models::{DataGraph, RecordId};

/// Key under which the document is persisted.
pub const STORAGE_KEY: &str = "barraLibre";

/// Callback run after every successful save.
pub type SaveCallback = Box<dyn FnMut(&DataGraph)>;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] KvError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("Record id {0} appears more than once")]
    DuplicateId(RecordId),

    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Loads and persists the document, one whole-document write per save.
pub struct RecordStore<S> {
    kv: S,
    key: String,
    on_save: Option<SaveCallback>,
}

impl<S: KeyValueStore> RecordStore<S> {
    pub fn new(kv: S) -> Self {
        Self::with_key(kv, STORAGE_KEY)
    }

    pub fn with_key(kv: S, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
            on_save: None,
        }
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    /// Reads the persisted document.
    ///
    /// A missing, unreadable or malformed document yields the defaults; the
    /// problem is logged and never reported to the caller.
    pub fn load(&self) -> DataGraph {
        let text = match self.kv.get(&self.key) {
            Ok(Some(text)) => text,
            Ok(None) => {
                tracing::debug!("No stored document under '{}', using defaults", self.key);
                return DataGraph::default();
            }
            Err(e) => {
                tracing::warn!("Failed to read stored document: {}", e);
                return DataGraph::default();
            }
        };

        let decoded = serde_json::from_str::<Value>(&text)
            .map_err(DocumentError::from)
            .and_then(|value| document::decode(value, Shape::Stored));

        match decoded {
            Ok(graph) => graph,
            Err(e) => {
                tracing::warn!("Stored document is corrupt, using defaults: {}", e);
                DataGraph::default()
            }
        }
    }

    /// Persists the whole document, then runs the save callback.
    ///
    /// An invalid document is never written: the previously stored document
    /// stays as it was and the error is returned.
    pub fn save(&mut self, graph: &DataGraph) -> Result<(), StoreError> {
        if let Some(id) = graph.duplicate_id() {
            tracing::error!("Refusing to save document: duplicate record id {}", id);
            return Err(StoreError::DuplicateId(id));
        }

        let text = serde_json::to_string(graph)?;
        if let Err(e) = self.kv.set(&self.key, &text) {
            tracing::error!("Failed to write document: {}", e);
            return Err(e.into());
        }
        tracing::debug!(
            "Saved document ({} workouts, {} body logs, {} tombstones)",
            graph.workouts.len(),
            graph.body_logs.len(),
            graph.deleted_ids.len()
        );

        if let Some(callback) = self.on_save.as_mut() {
            callback(graph);
        }
        Ok(())
    }

    /// Saves a raw JSON document after checking its structure.
    ///
    /// Returns the decoded document that was stored.
    pub fn save_document(&mut self, value: Value) -> Result<DataGraph, StoreError> {
        let graph = document::decode(value, Shape::Stored).map_err(|e| {
            tracing::error!("Refusing to save document: {}", e);
            e
        })?;
        self.save(&graph)?;
        Ok(graph)
    }

    /// Registers the post-save callback, replacing any previous one.
    pub fn set_on_save(&mut self, callback: impl FnMut(&DataGraph) + 'static) {
        self.on_save = Some(Box::new(callback));
    }

    pub fn clear_on_save(&mut self) {
        self.on_save = None;
    }

    pub fn exists(&self) -> bool {
        matches!(self.kv.get(&self.key), Ok(Some(_)))
    }

    /// Deletes the persisted document entirely.
    pub fn wipe(&mut self) -> Result<(), StoreError> {
        self.kv.remove(&self.key)?;
        tracing::info!("Wiped stored document '{}'", self.key);
        Ok(())
    }
}

impl<S: fmt::Debug> fmt::Debug for RecordStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("kv", &self.kv)
            .field("key", &self.key)
            .field("on_save", &self.on_save.is_some())
            .finish()
    }
}
