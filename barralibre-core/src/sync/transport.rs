//! The storage surface a backup provider has to offer.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::io;
use thiserror::Error;

/// Name of the single backup file kept by every provider.
pub const BACKUP_FILE_NAME: &str = "barra-libre-backup.json";

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("authorization cancelled")]
    AuthCancelled,

    #[error("network error: {0}")]
    Network(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Acknowledgement of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadAck {
    /// `true` when an existing backup was replaced, `false` when it was
    /// created.
    pub updated: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RemoteSnapshot {
    pub content: String,
    pub modified_time: Option<DateTime<Utc>>,
}

/// A past version of the backup file.
#[derive(Debug, Clone, PartialEq)]
pub struct Revision {
    pub id: String,
    pub modified_time: DateTime<Utc>,
    pub size: Option<u64>,
}

/// A provider holding one opaque JSON backup plus its revision history.
pub trait BackupTransport {
    /// Replaces the backup with `content`, creating it if needed.
    fn upload(&self, content: &str) -> impl Future<Output = Result<UploadAck, TransportError>>;

    /// Returns the current backup, or `None` if there is none yet.
    fn download(&self) -> impl Future<Output = Result<Option<RemoteSnapshot>, TransportError>>;

    /// Lists earlier versions of the backup, oldest first.
    fn list_revisions(&self) -> impl Future<Output = Result<Vec<Revision>, TransportError>>;

    fn download_revision(&self, id: &str) -> impl Future<Output = Result<String, TransportError>>;
}

impl<T: BackupTransport> BackupTransport for &T {
    fn upload(&self, content: &str) -> impl Future<Output = Result<UploadAck, TransportError>> {
        (**self).upload(content)
    }

    fn download(&self) -> impl Future<Output = Result<Option<RemoteSnapshot>, TransportError>> {
        (**self).download()
    }

    fn list_revisions(&self) -> impl Future<Output = Result<Vec<Revision>, TransportError>> {
        (**self).list_revisions()
    }

    fn download_revision(&self, id: &str) -> impl Future<Output = Result<String, TransportError>> {
        (**self).download_revision(id)
    }
}
