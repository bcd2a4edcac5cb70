//! Debounced backup scheduling.
//!
//! ```text
//! Idle ── on_save ──> Scheduled{due} ── poll(due) / flush ──> InFlight
//!   ^                   │  ^                                     │
//!   │                   └──┘ on_save resets due                  │
//!   └──────────────── finish(Ok) ─── Idle | Failed ── finish(Err)┘
//! ```
//!
//! Pulls and manual operations enter `InFlight` through [`BackupScheduler::begin`],
//! which only succeeds from `Idle` or `Failed`. Saves made while an
//! operation is in flight do not schedule a backup.

use std::time::Duration;
use tokio::time::Instant;

use super::error::SyncError;

/// Default quiet period between the last save and the automatic backup.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupState {
    Idle,
    Scheduled { due: Instant },
    InFlight,
    Failed { reason: String },
}

#[derive(Debug, Clone)]
pub struct BackupScheduler {
    enabled: bool,
    debounce: Duration,
    state: BackupState,
}

impl Default for BackupScheduler {
    fn default() -> Self {
        Self::new(true, DEFAULT_DEBOUNCE)
    }
}

impl BackupScheduler {
    pub fn new(enabled: bool, debounce: Duration) -> Self {
        Self {
            enabled,
            debounce,
            state: BackupState::Idle,
        }
    }

    pub fn state(&self) -> &BackupState {
        &self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn debounce(&self) -> Duration {
        self.debounce
    }

    pub fn is_in_flight(&self) -> bool {
        self.state == BackupState::InFlight
    }

    /// Deadline of the pending backup, if one is scheduled.
    pub fn due(&self) -> Option<Instant> {
        match self.state {
            BackupState::Scheduled { due } => Some(due),
            _ => None,
        }
    }

    /// Records a local save. Returns `true` if a backup is now scheduled.
    pub fn on_save(&mut self, now: Instant) -> bool {
        if !self.enabled {
            return false;
        }
        if self.is_in_flight() {
            tracing::debug!("Save during sync, not scheduling a backup");
            return false;
        }
        let due = now + self.debounce;
        tracing::debug!("Backup scheduled in {:?}", self.debounce);
        self.state = BackupState::Scheduled { due };
        true
    }

    /// Starts the scheduled backup once its deadline has passed.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.state {
            BackupState::Scheduled { due } if now >= due => {
                self.state = BackupState::InFlight;
                true
            }
            _ => false,
        }
    }

    /// Starts the scheduled backup right away.
    pub fn flush(&mut self) -> bool {
        match self.state {
            BackupState::Scheduled { .. } => {
                self.state = BackupState::InFlight;
                true
            }
            _ => false,
        }
    }

    /// Starts an unscheduled operation (pull, restore, revision listing).
    pub fn begin(&mut self) -> Result<(), SyncError> {
        match self.state {
            BackupState::Idle | BackupState::Failed { .. } => {
                self.state = BackupState::InFlight;
                Ok(())
            }
            BackupState::Scheduled { .. } | BackupState::InFlight => Err(SyncError::Busy),
        }
    }

    /// Ends the in-flight operation.
    pub fn finish(&mut self, result: Result<(), String>) {
        if !self.is_in_flight() {
            tracing::warn!("finish() called with no sync in flight ({:?})", self.state);
        }
        self.state = match result {
            Ok(()) => BackupState::Idle,
            Err(reason) => BackupState::Failed { reason },
        };
    }
}
