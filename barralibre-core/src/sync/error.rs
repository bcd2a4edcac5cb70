//! Sync error types.

use super::transport::TransportError;
use crate::document::DocumentError;
use crate::session::SessionError;
use crate::store::StoreError;

/// Errors that can occur while backing up or restoring the document.
///
/// None of these leave the local document modified.
#[derive(Debug)]
pub enum SyncError {
    /// The backup provider rejected the credentials
    Auth(String),
    /// The user cancelled sign-in
    AuthCancelled,
    /// The provider could not be reached
    Network(String),
    /// The provider answered with an error status
    Http { status: u16, message: String },
    /// Nothing has been backed up yet
    NoBackup,
    /// The requested revision does not exist
    RevisionNotFound(String),
    /// The backup is not a valid document
    InvalidBackup(String),
    /// Another sync operation is pending or in flight
    Busy,
    /// Local backup storage failed
    Io(String),
    /// The merged document could not be saved locally
    Store(String),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Auth(e) => write!(
                f,
                "Not authorized: {}. Run 'barra auth login' to sign in again.",
                e
            ),
            SyncError::AuthCancelled => write!(f, "Sign-in was cancelled"),
            SyncError::Network(e) => write!(f, "Could not reach the backup provider: {}", e),
            SyncError::Http { status, message } => {
                write!(f, "Backup provider error (HTTP {}): {}", status, message)
            }
            SyncError::NoBackup => write!(f, "No backup found. Run 'barra sync backup' first."),
            SyncError::RevisionNotFound(id) => write!(
                f,
                "Revision '{}' not found. Run 'barra sync revisions' to list them.",
                id
            ),
            SyncError::InvalidBackup(e) => write!(f, "The backup is not valid: {}", e),
            SyncError::Busy => write!(f, "A sync operation is already pending or in progress"),
            SyncError::Io(e) => write!(f, "Backup storage error: {}", e),
            SyncError::Store(e) => write!(f, "Failed to save merged data: {}", e),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<TransportError> for SyncError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Auth(msg) => SyncError::Auth(msg),
            TransportError::AuthCancelled => SyncError::AuthCancelled,
            TransportError::Network(msg) => SyncError::Network(msg),
            TransportError::NotFound(_) => SyncError::NoBackup,
            TransportError::Http { status, message } => SyncError::Http { status, message },
            TransportError::Io(e) => SyncError::Io(e.to_string()),
        }
    }
}

impl From<DocumentError> for SyncError {
    fn from(e: DocumentError) -> Self {
        SyncError::InvalidBackup(e.to_string())
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Store(e.to_string())
    }
}

impl From<SessionError> for SyncError {
    fn from(e: SessionError) -> Self {
        SyncError::Store(e.to_string())
    }
}
