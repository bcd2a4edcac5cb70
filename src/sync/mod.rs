//! Backup providers and automatic sync for the CLI.
//!
//! The core crate decides when to back up and how to merge; this module
//! picks the provider from the configuration:
//! - `folder`: a directory, usually one kept in sync by another tool
//! - `drive`: the Google Drive app data folder, signed in with `barra auth login`

pub mod auto_sync;
pub mod drive;
pub mod token;

use std::path::Path;
use std::time::Duration;

use barralibre_core::sync::{
    BackupScheduler, BackupTransport, FolderTransport, RemoteSnapshot, Revision, SyncOrchestrator,
    TransportError, UploadAck,
};
use barralibre_core::MergeOptions;

use crate::config::{Config, SyncBackend, SyncConfig};

pub use auto_sync::AutoSync;
pub use drive::DriveTransport;
pub use token::{OAuthClient, Pkce, TokenError, TokenManager, TokenStore};

/// The configured backup provider.
pub enum Backend {
    Folder(FolderTransport),
    Drive(DriveTransport),
}

impl Backend {
    pub fn from_config(sync: &SyncConfig, data_dir: &Path) -> Result<Self, BackendError> {
        match sync.effective_backend() {
            Some(SyncBackend::Folder) => {
                let folder = sync.folder.clone().ok_or(BackendError::MissingFolder)?;
                Ok(Backend::Folder(
                    FolderTransport::new(folder).with_keep_revisions(sync.keep_revisions),
                ))
            }
            Some(SyncBackend::Drive) => {
                let oauth = oauth_client(sync)?;
                let tokens = TokenManager::new(TokenStore::new(data_dir), oauth);
                Ok(Backend::Drive(DriveTransport::new(tokens)))
            }
            None => Err(BackendError::NotConfigured),
        }
    }

    pub fn kind(&self) -> SyncBackend {
        match self {
            Backend::Folder(_) => SyncBackend::Folder,
            Backend::Drive(_) => SyncBackend::Drive,
        }
    }
}

impl BackupTransport for Backend {
    async fn upload(&self, content: &str) -> Result<UploadAck, TransportError> {
        match self {
            Backend::Folder(t) => t.upload(content).await,
            Backend::Drive(t) => t.upload(content).await,
        }
    }

    async fn download(&self) -> Result<Option<RemoteSnapshot>, TransportError> {
        match self {
            Backend::Folder(t) => t.download().await,
            Backend::Drive(t) => t.download().await,
        }
    }

    async fn list_revisions(&self) -> Result<Vec<Revision>, TransportError> {
        match self {
            Backend::Folder(t) => t.list_revisions().await,
            Backend::Drive(t) => t.list_revisions().await,
        }
    }

    async fn download_revision(&self, id: &str) -> Result<String, TransportError> {
        match self {
            Backend::Folder(t) => t.download_revision(id).await,
            Backend::Drive(t) => t.download_revision(id).await,
        }
    }
}

/// OAuth client for the drive backend.
pub fn oauth_client(sync: &SyncConfig) -> Result<OAuthClient, BackendError> {
    let client_id = sync.client_id.clone().ok_or(BackendError::MissingClientId)?;
    Ok(OAuthClient::new(client_id, sync.client_secret.clone()))
}

/// Builds an orchestrator for the configured backend.
pub fn orchestrator(config: &Config) -> Result<SyncOrchestrator<Backend>, BackendError> {
    let backend = Backend::from_config(&config.sync, &config.data_dir.value)?;
    let scheduler = BackupScheduler::new(
        config.sync.auto_sync,
        Duration::from_secs(config.sync.debounce_secs),
    );
    Ok(SyncOrchestrator::new(backend, scheduler).with_merge_options(MergeOptions {
        scalars: config.sync.scalar_policy,
    }))
}

/// Errors selecting a backup provider
#[derive(Debug)]
pub enum BackendError {
    /// No backend configured
    NotConfigured,
    /// Folder backend without a folder
    MissingFolder,
    /// Drive backend without an OAuth client id
    MissingClientId,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::NotConfigured => write!(
                f,
                "Sync not configured. Set sync.folder or sync.backend in config."
            ),
            BackendError::MissingFolder => write!(
                f,
                "Folder backend needs sync.folder (or BARRA_SYNC_FOLDER)."
            ),
            BackendError::MissingClientId => write!(
                f,
                "Drive backend needs sync.client_id (or BARRA_CLIENT_ID)."
            ),
        }
    }
}

impl std::error::Error for BackendError {}
