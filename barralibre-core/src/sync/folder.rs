//! Backups kept in a plain directory, typically one synced by another tool.
//!
//! Layout:
//!
//! ```text
//! <folder>/barra-libre-backup.json
//! <folder>/revisions/<upload time in ms>.json
//! ```

use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::transport::{
    BackupTransport, RemoteSnapshot, Revision, TransportError, UploadAck, BACKUP_FILE_NAME,
};

const REVISIONS_DIR: &str = "revisions";

/// Revisions kept unless configured otherwise.
pub const DEFAULT_KEEP_REVISIONS: usize = 100;

#[derive(Debug, Clone)]
pub struct FolderTransport {
    folder: PathBuf,
    keep_revisions: usize,
}

impl FolderTransport {
    pub fn new(folder: PathBuf) -> Self {
        Self {
            folder,
            keep_revisions: DEFAULT_KEEP_REVISIONS,
        }
    }

    pub fn with_keep_revisions(mut self, keep: usize) -> Self {
        self.keep_revisions = keep.max(1);
        self
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn backup_path(&self) -> PathBuf {
        self.folder.join(BACKUP_FILE_NAME)
    }

    fn revisions_dir(&self) -> PathBuf {
        self.folder.join(REVISIONS_DIR)
    }

    async fn write_revision(&self, content: &str) -> Result<(), TransportError> {
        let dir = self.revisions_dir();
        fs::create_dir_all(&dir).await?;

        let mut millis = Utc::now().timestamp_millis();
        let mut path = dir.join(format!("{}.json", millis));
        while fs::try_exists(&path).await? {
            millis += 1;
            path = dir.join(format!("{}.json", millis));
        }
        fs::write(&path, content).await?;
        Ok(())
    }

    async fn revision_ids(&self) -> Result<Vec<i64>, TransportError> {
        let mut entries = match fs::read_dir(self.revisions_dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(id) = revision_id(&entry.path()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    async fn prune(&self) -> Result<(), TransportError> {
        let ids = self.revision_ids().await?;
        if ids.len() <= self.keep_revisions {
            return Ok(());
        }
        let excess = ids.len() - self.keep_revisions;
        for id in &ids[..excess] {
            let path = self.revisions_dir().join(format!("{}.json", id));
            if let Err(e) = fs::remove_file(&path).await {
                tracing::warn!("Failed to prune revision {}: {}", path.display(), e);
            }
        }
        tracing::debug!("Pruned {} old revisions", excess);
        Ok(())
    }
}

fn revision_id(path: &Path) -> Option<i64> {
    if path.extension()? != "json" {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

impl BackupTransport for FolderTransport {
    async fn upload(&self, content: &str) -> Result<UploadAck, TransportError> {
        fs::create_dir_all(&self.folder).await?;
        let path = self.backup_path();
        let updated = fs::try_exists(&path).await?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &path).await?;

        self.write_revision(content).await?;
        self.prune().await?;
        Ok(UploadAck { updated })
    }

    async fn download(&self) -> Result<Option<RemoteSnapshot>, TransportError> {
        let path = self.backup_path();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let modified_time = fs::metadata(&path)
            .await
            .and_then(|meta| meta.modified())
            .map(DateTime::<Utc>::from)
            .ok();
        Ok(Some(RemoteSnapshot {
            content,
            modified_time,
        }))
    }

    async fn list_revisions(&self) -> Result<Vec<Revision>, TransportError> {
        let mut revisions = Vec::new();
        for id in self.revision_ids().await? {
            let Some(modified_time) = DateTime::<Utc>::from_timestamp_millis(id) else {
                continue;
            };
            let path = self.revisions_dir().join(format!("{}.json", id));
            let size = fs::metadata(&path).await.ok().map(|meta| meta.len());
            revisions.push(Revision {
                id: id.to_string(),
                modified_time,
                size,
            });
        }
        Ok(revisions)
    }

    async fn download_revision(&self, id: &str) -> Result<String, TransportError> {
        let millis: i64 = id
            .parse()
            .map_err(|_| TransportError::NotFound(format!("revision {}", id)))?;
        let path = self.revisions_dir().join(format!("{}.json", millis));
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(TransportError::NotFound(format!("revision {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }
}
