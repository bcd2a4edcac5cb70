//! Barra Libre Core Library
//!
//! Workout data model, local document store, tombstoned merge and backup
//! sync for Barra Libre applications.

pub mod catalog;
pub mod document;
pub mod merge;
pub mod models;
pub mod session;
pub mod store;
pub mod sync;
pub mod tombstone;

pub use catalog::{validate_program, CatalogError, ProgramCatalog};
pub use document::{export_file_name, export_json, parse_snapshot, DocumentError};
pub use merge::{merge, merge_with, scalar_changes, MergeOptions, ScalarField, ScalarPolicy};
pub use models::{
    BodyLog, DataGraph, Exercise, PersonalRecord, ProgramDefinition, Record, RecordId, SetEntry,
    Settings, Workout,
};
pub use session::{ImportSummary, Session, SessionError};
pub use store::{FileKvStore, KeyValueStore, MemoryKvStore, RecordStore, StoreError};
pub use sync::{
    BackupScheduler, BackupTransport, FolderTransport, PendingRestore, PullOutcome,
    RestoreSource, SyncError, SyncOrchestrator, TransportError,
};
pub use tombstone::{mark_deleted, Tombstones};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
