//! Backup and restore of the document through a [`BackupTransport`].
//!
//! The [`SyncOrchestrator`] owns the scheduling state machine and decides
//! when to upload, pull or restore. Reconciliation itself lives in
//! [`crate::merge`]; providers only move opaque JSON blobs.

mod error;
mod folder;
mod orchestrator;
mod scheduler;
mod transport;

pub use error::SyncError;
pub use folder::{FolderTransport, DEFAULT_KEEP_REVISIONS};
pub use orchestrator::{PendingRestore, PullOutcome, RestoreSource, SyncOrchestrator};
pub use scheduler::{BackupScheduler, BackupState, DEFAULT_DEBOUNCE};
pub use transport::{
    BackupTransport, RemoteSnapshot, Revision, TransportError, UploadAck, BACKUP_FILE_NAME,
};
