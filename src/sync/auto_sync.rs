//! Auto-sync functionality for CLI commands.
//!
//! When `auto_sync` is enabled, every command that touches the data pulls
//! and merges the backup first. Saves made by write commands schedule a
//! backup that is flushed before the process exits; the flush merges the
//! remote snapshot again so a stale device never overwrites newer records.
//!
//! Failures are reported on stderr and never fail the command itself, so the
//! CLI keeps working offline.

use barralibre_core::sync::{PullOutcome, SyncOrchestrator};
use barralibre_core::{FileKvStore, Session};

use super::{orchestrator, Backend};
use crate::config::Config;

pub struct AutoSync {
    orchestrator: SyncOrchestrator<Backend>,
}

impl AutoSync {
    /// Returns `None` unless auto-sync is enabled and a backend is configured.
    pub fn from_config(config: &Config) -> Option<Self> {
        if !config.sync.auto_sync || !config.sync.is_configured() {
            return None;
        }
        match orchestrator(config) {
            Ok(orchestrator) => Some(Self { orchestrator }),
            Err(e) => {
                eprintln!("Auto-sync: {}", e);
                None
            }
        }
    }

    /// Makes saves in `session` schedule a backup.
    pub fn attach(&self, session: &mut Session<FileKvStore>) {
        self.orchestrator.attach(session.store_mut());
    }

    /// Pulls the backup into `session`.
    pub fn pull(&self, session: &mut Session<FileKvStore>) {
        let Some(rt) = runtime() else {
            return;
        };
        match rt.block_on(self.orchestrator.on_visible(session)) {
            Ok(PullOutcome::Merged {
                workouts,
                body_logs,
            }) => {
                tracing::debug!(
                    "Auto-sync merged backup ({} workouts, {} body logs)",
                    workouts,
                    body_logs
                );
            }
            Ok(outcome) => tracing::debug!("Auto-sync pull: {:?}", outcome),
            Err(e) => eprintln!("Auto-sync: {}", e),
        }
    }

    /// Runs a pending backup now.
    pub fn flush(&self, session: &mut Session<FileKvStore>) {
        if !self.orchestrator.has_pending_backup() {
            return;
        }
        let Some(rt) = runtime() else {
            return;
        };
        if let Some(Err(e)) = rt.block_on(self.orchestrator.flush_merged(session)) {
            eprintln!("Auto-sync: backup failed: {}", e);
        }
    }
}

fn runtime() -> Option<tokio::runtime::Runtime> {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => Some(rt),
        Err(e) => {
            tracing::warn!("Auto-sync: failed to create runtime: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSource, ConfigValue, SyncConfig};
    use barralibre_core::{RecordStore, Workout};
    use chrono::NaiveDate;
    use std::path::Path;
    use tempfile::TempDir;

    fn config(root: &Path, auto_sync: bool) -> Config {
        let data_dir = root.join("data");
        Config {
            programs_dir: ConfigValue::new(data_dir.join("programs"), ConfigSource::Default),
            data_dir: ConfigValue::new(data_dir, ConfigSource::Default),
            config_file: None,
            sync: SyncConfig {
                auto_sync,
                folder: Some(root.join("backups")),
                ..Default::default()
            },
        }
    }

    fn session(config: &Config) -> Session<FileKvStore> {
        Session::open(RecordStore::new(FileKvStore::new(
            config.data_dir.value.clone(),
        )))
    }

    fn workout(session: &Session<FileKvStore>, day: u32) -> Workout {
        Workout::new(
            session.next_id(),
            NaiveDate::from_ymd_opt(2026, 3, day).unwrap(),
            "A",
            1,
        )
    }

    #[test]
    fn test_disabled_without_flag() {
        let temp_dir = TempDir::new().unwrap();
        assert!(AutoSync::from_config(&config(temp_dir.path(), false)).is_none());
        assert!(AutoSync::from_config(&config(temp_dir.path(), true)).is_some());
    }

    #[test]
    fn test_write_then_flush_backs_up() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path(), true);
        let auto = AutoSync::from_config(&config).unwrap();

        let mut session = session(&config);
        auto.attach(&mut session);
        let w = workout(&session, 1);
        session.add_workout(w).unwrap();
        auto.flush(&mut session);

        let backup = temp_dir
            .path()
            .join("backups")
            .join(barralibre_core::sync::BACKUP_FILE_NAME);
        let content = std::fs::read_to_string(backup).unwrap();
        assert_eq!(barralibre_core::parse_snapshot(&content).unwrap().workouts.len(), 1);
    }

    #[test]
    fn test_pull_merges_other_device() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path(), true);

        // Another device backs up a workout
        let other_dir = temp_dir.path().join("other");
        let mut other = Session::open(RecordStore::new(FileKvStore::new(other_dir)));
        let auto_other = AutoSync::from_config(&config).unwrap();
        auto_other.attach(&mut other);
        let w = workout(&other, 2);
        other.add_workout(w).unwrap();
        auto_other.flush(&mut other);

        let auto = AutoSync::from_config(&config).unwrap();
        let mut session = session(&config);
        auto.attach(&mut session);
        auto.pull(&mut session);

        assert_eq!(session.graph().workouts.len(), 1);
        // The pull itself does not schedule another backup
        assert!(!auto.orchestrator.has_pending_backup());
    }

    #[test]
    fn test_write_on_stale_device_keeps_remote_records() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(temp_dir.path(), true);

        let mut device_a = Session::open(RecordStore::new(FileKvStore::new(
            temp_dir.path().join("device-a"),
        )));
        let auto_a = AutoSync::from_config(&config).unwrap();
        auto_a.attach(&mut device_a);
        let w = workout(&device_a, 3);
        device_a.add_workout(w).unwrap();
        auto_a.flush(&mut device_a);

        // Device B writes without pulling first.
        let mut device_b = Session::open(RecordStore::new(FileKvStore::new(
            temp_dir.path().join("device-b"),
        )));
        let auto_b = AutoSync::from_config(&config).unwrap();
        auto_b.attach(&mut device_b);
        let mut w = workout(&device_b, 4);
        w.id = barralibre_core::RecordId::new(w.id.as_millis() + 1000);
        device_b.add_workout(w).unwrap();
        auto_b.flush(&mut device_b);

        let backup = temp_dir
            .path()
            .join("backups")
            .join(barralibre_core::sync::BACKUP_FILE_NAME);
        let content = std::fs::read_to_string(backup).unwrap();
        let remote = barralibre_core::parse_snapshot(&content).unwrap();
        assert_eq!(remote.workouts.len(), 2);
        assert_eq!(device_b.graph().workouts.len(), 2);
    }
}
