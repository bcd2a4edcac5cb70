//! Sync CLI commands for backing up and restoring the document.

use clap::{Args, Subcommand};

use barralibre_core::sync::{BackupTransport, PendingRestore, RestoreSource, SyncError};
use barralibre_core::{FileKvStore, Session};

use super::confirm;
use crate::config::{Config, SyncBackend};
use crate::sync::{orchestrator, BackendError};

/// Back up and restore with the configured provider
#[derive(Args)]
pub struct SyncCommand {
    #[command(subcommand)]
    pub command: SyncSubcommand,
}

#[derive(Subcommand)]
pub enum SyncSubcommand {
    /// Upload the current data now
    Backup,

    /// Merge the backup (or one of its revisions) into local data
    Restore {
        /// Revision ID from 'barra sync revisions'
        #[arg(long, short)]
        revision: Option<String>,

        /// Skip confirmation prompt
        #[arg(long, short)]
        yes: bool,
    },

    /// List the backup's revisions
    Revisions,

    /// Merge the current backup into local data without prompting
    Pull,

    /// Show sync configuration and backup status
    Status,
}

impl SyncCommand {
    pub fn run(
        &self,
        session: &mut Session<FileKvStore>,
        config: &Config,
    ) -> Result<(), SyncCommandError> {
        if let SyncSubcommand::Status = self.command {
            return self.status(config);
        }

        let orchestrator = orchestrator(config)?;
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| SyncCommandError::RuntimeError(e.to_string()))?;

        match &self.command {
            SyncSubcommand::Backup => {
                let ack = rt.block_on(orchestrator.backup_now(session.graph()))?;
                let backend = orchestrator.transport().kind();
                if ack.updated {
                    println!("✓ Backup updated ({})", backend);
                } else {
                    println!("✓ Backup created ({})", backend);
                }
                Ok(())
            }

            SyncSubcommand::Restore { revision, yes } => {
                let source = match revision {
                    Some(id) => RestoreSource::Revision(id.clone()),
                    None => RestoreSource::Current,
                };
                let pending = rt.block_on(orchestrator.fetch_restore(session.graph(), source))?;
                print_pending(session, &pending);

                if !yes && !confirm("Apply this restore?")? {
                    println!("Restore cancelled.");
                    return Ok(());
                }
                orchestrator.commit_restore(session, pending)?;
                println!("✓ Restore applied");
                Ok(())
            }

            SyncSubcommand::Revisions => {
                let revisions = rt.block_on(orchestrator.revisions())?;
                if revisions.is_empty() {
                    println!("No revisions found");
                    return Ok(());
                }
                for r in &revisions {
                    let size = r
                        .size
                        .map(|s| format!("{} bytes", s))
                        .unwrap_or_default();
                    println!(
                        "{:24} {}  {}",
                        r.id,
                        r.modified_time.format("%Y-%m-%d %H:%M:%S"),
                        size
                    );
                }
                println!("\nTotal: {} revision(s)", revisions.len());
                Ok(())
            }

            SyncSubcommand::Pull => {
                let pending =
                    rt.block_on(orchestrator.fetch_restore(session.graph(), RestoreSource::Current))?;
                if &pending.merged == session.graph() {
                    println!("✓ Already up to date");
                    return Ok(());
                }
                let (workouts, body_logs) = (pending.workouts, pending.body_logs);
                orchestrator.commit_restore(session, pending)?;
                println!(
                    "✓ Merged backup ({} workouts, {} body logs)",
                    workouts, body_logs
                );
                Ok(())
            }

            SyncSubcommand::Status => Ok(()),
        }
    }

    fn status(&self, config: &Config) -> Result<(), SyncCommandError> {
        println!("Sync Configuration");
        println!("==================");
        println!();

        if !config.sync.is_configured() {
            println!("Status: Not configured");
            println!();
            println!("To enable sync, add to your config file:");
            println!();
            println!("  sync:");
            println!("    folder: \"~/Dropbox/barra-libre\"");
            println!();
            println!("or, for Google Drive:");
            println!();
            println!("  sync:");
            println!("    backend: drive");
            println!("    client_id: \"<OAuth client id>\"");
            println!();
            println!("Or set environment variables:");
            println!("  BARRA_SYNC_FOLDER, BARRA_CLIENT_ID");
            return Ok(());
        }

        match config.sync.effective_backend() {
            Some(SyncBackend::Folder) => {
                if let Some(folder) = &config.sync.folder {
                    println!("Backend:   folder ({})", folder.display());
                }
                println!("Revisions: keep {}", config.sync.keep_revisions);
            }
            Some(SyncBackend::Drive) => println!("Backend:   Google Drive (app data)"),
            None => {}
        }
        println!(
            "Auto-sync: {}",
            if config.sync.auto_sync {
                format!("enabled ({}s debounce)", config.sync.debounce_secs)
            } else {
                "disabled".to_string()
            }
        );
        println!("Scalars:   {} wins", config.sync.scalar_policy);
        println!();

        let orchestrator = orchestrator(config)?;
        let rt = tokio::runtime::Runtime::new()
            .map_err(|e| SyncCommandError::RuntimeError(e.to_string()))?;

        print!("Backup: ");
        match rt.block_on(orchestrator.transport().download()) {
            Ok(Some(snapshot)) => match snapshot.modified_time {
                Some(time) => println!("✓ last updated {}", time.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("✓ present"),
            },
            Ok(None) => println!("none yet"),
            Err(e) => println!("✗ {}", SyncError::from(e)),
        }
        Ok(())
    }
}

fn print_pending(session: &Session<FileKvStore>, pending: &PendingRestore) {
    let graph = session.graph();
    match &pending.source {
        RestoreSource::Current => match pending.remote_modified {
            Some(time) => println!("Backup from {}", time.format("%Y-%m-%d %H:%M:%S UTC")),
            None => println!("Current backup"),
        },
        RestoreSource::Revision(id) => println!("Revision {}", id),
    }
    println!(
        "  workouts:  {} -> {}",
        graph.workouts.len(),
        pending.workouts
    );
    println!(
        "  body logs: {} -> {}",
        graph.body_logs.len(),
        pending.body_logs
    );

    if !pending.scalar_changes.is_empty() {
        let fields: Vec<String> = pending
            .scalar_changes
            .iter()
            .map(ToString::to_string)
            .collect();
        println!();
        println!(
            "Warning: the backup will replace your local {}.",
            fields.join(", ")
        );
    }
    println!();
}

/// Errors from sync commands
#[derive(Debug)]
pub enum SyncCommandError {
    BackendError(BackendError),
    SyncError(SyncError),
    IoError(std::io::Error),
    RuntimeError(String),
}

impl std::fmt::Display for SyncCommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncCommandError::BackendError(e) => write!(f, "{}", e),
            SyncCommandError::SyncError(e) => write!(f, "{}", e),
            SyncCommandError::IoError(e) => write!(f, "I/O error: {}", e),
            SyncCommandError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for SyncCommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncCommandError::BackendError(e) => Some(e),
            SyncCommandError::SyncError(e) => Some(e),
            SyncCommandError::IoError(e) => Some(e),
            SyncCommandError::RuntimeError(_) => None,
        }
    }
}

impl From<BackendError> for SyncCommandError {
    fn from(e: BackendError) -> Self {
        SyncCommandError::BackendError(e)
    }
}

impl From<SyncError> for SyncCommandError {
    fn from(e: SyncError) -> Self {
        SyncCommandError::SyncError(e)
    }
}

impl From<std::io::Error> for SyncCommandError {
    fn from(e: std::io::Error) -> Self {
        SyncCommandError::IoError(e)
    }
}
