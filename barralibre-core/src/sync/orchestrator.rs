//! Decides when the local document is backed up, pulled and restored.

use chrono::{DateTime, Utc};
use std::cell::RefCell;
use std::rc::Rc;
use tokio::time::Instant;

use super::error::SyncError;
use super::scheduler::{BackupScheduler, BackupState};
use super::transport::{BackupTransport, Revision, TransportError, UploadAck};
use crate::document;
use crate::merge::{merge_with, scalar_changes, MergeOptions, ScalarField, ScalarPolicy};
use crate::models::DataGraph;
use crate::session::Session;
use crate::store::{KeyValueStore, RecordStore};

/// Where a restore reads the remote snapshot from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreSource {
    Current,
    Revision(String),
}

/// A merged restore awaiting confirmation.
#[derive(Debug, Clone)]
pub struct PendingRestore {
    pub source: RestoreSource,
    pub merged: DataGraph,
    pub remote_modified: Option<DateTime<Utc>>,
    /// Non-record fields the restore will overwrite.
    pub scalar_changes: Vec<ScalarField>,
    pub workouts: usize,
    pub body_logs: usize,
}

/// Result of a foreground pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// Auto-sync is off.
    Disabled,
    /// Another operation is pending or running.
    Skipped,
    NoBackup,
    /// The remote snapshot added nothing.
    UpToDate,
    Merged { workouts: usize, body_logs: usize },
}

pub struct SyncOrchestrator<T> {
    transport: T,
    scheduler: Rc<RefCell<BackupScheduler>>,
    options: MergeOptions,
}

impl<T: BackupTransport> SyncOrchestrator<T> {
    pub fn new(transport: T, scheduler: BackupScheduler) -> Self {
        Self {
            transport,
            scheduler: Rc::new(RefCell::new(scheduler)),
            options: MergeOptions::default(),
        }
    }

    pub fn with_merge_options(mut self, options: MergeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> BackupState {
        self.scheduler.borrow().state().clone()
    }

    pub fn has_pending_backup(&self) -> bool {
        self.scheduler.borrow().due().is_some()
    }

    /// Makes every save of `store` schedule a debounced backup.
    pub fn attach<S: KeyValueStore>(&self, store: &mut RecordStore<S>) {
        let scheduler = Rc::clone(&self.scheduler);
        store.set_on_save(move |_| {
            scheduler.borrow_mut().on_save(Instant::now());
        });
    }

    fn begin(&self) -> Result<(), SyncError> {
        self.scheduler.borrow_mut().begin()
    }

    fn finish<R>(&self, result: &Result<R, SyncError>) {
        let outcome = match result {
            Ok(_) => Ok(()),
            Err(e) => Err(e.to_string()),
        };
        self.scheduler.borrow_mut().finish(outcome);
    }

    /// Uploads `graph`; the scheduler must already be in flight.
    async fn upload(&self, graph: &DataGraph) -> Result<UploadAck, SyncError> {
        let result = match document::export_json(graph) {
            Ok(content) => self.transport.upload(&content).await.map_err(SyncError::from),
            Err(e) => Err(e.into()),
        };
        match &result {
            Ok(ack) if ack.updated => tracing::info!("Backup updated"),
            Ok(_) => tracing::info!("Backup created"),
            Err(e) => tracing::warn!("Backup failed: {}", e),
        }
        self.finish(&result);
        result
    }

    /// Backs up `graph` now, taking over any scheduled backup.
    pub async fn backup_now(&self, graph: &DataGraph) -> Result<UploadAck, SyncError> {
        {
            let mut scheduler = self.scheduler.borrow_mut();
            if !scheduler.flush() {
                scheduler.begin()?;
            }
        }
        self.upload(graph).await
    }

    /// Runs the scheduled backup if its deadline has passed.
    pub async fn run_due(
        &self,
        graph: &DataGraph,
        now: Instant,
    ) -> Option<Result<UploadAck, SyncError>> {
        if !self.scheduler.borrow_mut().poll(now) {
            return None;
        }
        Some(self.upload(graph).await)
    }

    /// Waits for the debounce window to pass, then runs the backup.
    pub async fn wait_and_run(&self, graph: &DataGraph) -> Option<Result<UploadAck, SyncError>> {
        let due = self.scheduler.borrow().due()?;
        tokio::time::sleep_until(due).await;
        self.run_due(graph, Instant::now()).await
    }

    /// Flushes a pending backup when the app goes to the background.
    pub async fn on_hidden(&self, graph: &DataGraph) -> Option<Result<UploadAck, SyncError>> {
        if !self.scheduler.borrow_mut().flush() {
            return None;
        }
        tracing::debug!("Flushing pending backup");
        Some(self.upload(graph).await)
    }

    /// Flushes a pending backup after folding in the current remote snapshot.
    ///
    /// Records that other devices uploaded since the last pull end up in
    /// both `session` and the backup. The local document wins every
    /// conflict, since it holds the edits being backed up. Nothing is
    /// uploaded when the remote snapshot cannot be read.
    pub async fn flush_merged<S: KeyValueStore>(
        &self,
        session: &mut Session<S>,
    ) -> Option<Result<UploadAck, SyncError>> {
        if !self.scheduler.borrow_mut().flush() {
            return None;
        }
        tracing::debug!("Flushing pending backup with remote changes");
        match self.merge_remote(session).await {
            Ok(()) => Some(self.upload(session.graph()).await),
            Err(e) => {
                tracing::warn!("Backup postponed: {}", e);
                let result = Err(e);
                self.finish(&result);
                Some(result)
            }
        }
    }

    async fn merge_remote<S: KeyValueStore>(&self, session: &mut Session<S>) -> Result<(), SyncError> {
        let Some(snapshot) = self.transport.download().await? else {
            return Ok(());
        };
        let remote = document::parse_snapshot(&snapshot.content)?;
        let local_wins = MergeOptions {
            scalars: ScalarPolicy::Remote,
        };
        let merged = merge_with(&remote, session.graph(), local_wins);
        if &merged != session.graph() {
            session.commit(merged)?;
        }
        Ok(())
    }

    /// Pulls the remote snapshot into `session` when the app comes to the
    /// foreground.
    pub async fn on_visible<S: KeyValueStore>(
        &self,
        session: &mut Session<S>,
    ) -> Result<PullOutcome, SyncError> {
        if !self.scheduler.borrow().is_enabled() {
            return Ok(PullOutcome::Disabled);
        }
        if self.begin().is_err() {
            tracing::debug!("Sync busy, skipping pull");
            return Ok(PullOutcome::Skipped);
        }
        let result = self.pull(session).await;
        self.finish(&result);
        result
    }

    async fn pull<S: KeyValueStore>(
        &self,
        session: &mut Session<S>,
    ) -> Result<PullOutcome, SyncError> {
        let Some(snapshot) = self.transport.download().await? else {
            return Ok(PullOutcome::NoBackup);
        };
        let remote = document::parse_snapshot(&snapshot.content)?;
        let merged = merge_with(session.graph(), &remote, self.options);

        if &merged == session.graph() {
            return Ok(PullOutcome::UpToDate);
        }
        let outcome = PullOutcome::Merged {
            workouts: merged.workouts.len(),
            body_logs: merged.body_logs.len(),
        };
        session.commit(merged)?;
        tracing::info!("Pulled remote backup: {:?}", outcome);
        Ok(outcome)
    }

    /// Downloads and merges a snapshot without touching local state.
    ///
    /// The restore only takes effect through [`SyncOrchestrator::commit_restore`].
    pub async fn fetch_restore(
        &self,
        local: &DataGraph,
        source: RestoreSource,
    ) -> Result<PendingRestore, SyncError> {
        self.begin()?;
        let result = self.fetch(local, source).await;
        self.finish(&result);
        result
    }

    async fn fetch(
        &self,
        local: &DataGraph,
        source: RestoreSource,
    ) -> Result<PendingRestore, SyncError> {
        let (content, remote_modified) = match &source {
            RestoreSource::Current => {
                let snapshot = self
                    .transport
                    .download()
                    .await?
                    .ok_or(SyncError::NoBackup)?;
                (snapshot.content, snapshot.modified_time)
            }
            RestoreSource::Revision(id) => {
                let content = self
                    .transport
                    .download_revision(id)
                    .await
                    .map_err(|e| match e {
                        TransportError::NotFound(_) => SyncError::RevisionNotFound(id.clone()),
                        other => other.into(),
                    })?;
                (content, None)
            }
        };

        let remote = document::parse_snapshot(&content)?;
        let merged = merge_with(local, &remote, self.options);
        let changes = match self.options.scalars {
            ScalarPolicy::Remote => scalar_changes(local, &remote),
            ScalarPolicy::Local => Vec::new(),
        };

        Ok(PendingRestore {
            source,
            workouts: merged.workouts.len(),
            body_logs: merged.body_logs.len(),
            merged,
            remote_modified,
            scalar_changes: changes,
        })
    }

    /// Applies a confirmed restore.
    pub fn commit_restore<S: KeyValueStore>(
        &self,
        session: &mut Session<S>,
        pending: PendingRestore,
    ) -> Result<(), SyncError> {
        session.commit(pending.merged)?;
        tracing::info!("Restore committed from {:?}", pending.source);
        Ok(())
    }

    /// Lists the backup's revisions, oldest first.
    pub async fn revisions(&self) -> Result<Vec<Revision>, SyncError> {
        self.begin()?;
        let result = self
            .transport
            .list_revisions()
            .await
            .map_err(SyncError::from)
            .map(|mut revisions| {
                revisions.sort_by_key(|r| r.modified_time);
                revisions
            });
        self.finish(&result);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordId, Workout};
    use crate::store::MemoryKvStore;
    use crate::sync::transport::RemoteSnapshot;
    use chrono::NaiveDate;
    use std::cell::Cell;
    use std::time::Duration;

    #[derive(Clone, Copy)]
    enum Failure {
        Auth,
        Network,
    }

    #[derive(Default)]
    struct FakeTransport {
        remote: RefCell<Option<String>>,
        revisions: RefCell<Vec<(Revision, String)>>,
        uploads: RefCell<Vec<String>>,
        fail: Cell<Option<Failure>>,
    }

    impl FakeTransport {
        fn with_remote(content: &str) -> Self {
            let transport = Self::default();
            *transport.remote.borrow_mut() = Some(content.to_string());
            transport
        }

        fn check(&self) -> Result<(), TransportError> {
            match self.fail.get() {
                Some(Failure::Auth) => Err(TransportError::Auth("token expired".into())),
                Some(Failure::Network) => Err(TransportError::Network("offline".into())),
                None => Ok(()),
            }
        }
    }

    impl BackupTransport for FakeTransport {
        async fn upload(&self, content: &str) -> Result<UploadAck, TransportError> {
            self.check()?;
            self.uploads.borrow_mut().push(content.to_string());
            let updated = self.remote.borrow_mut().replace(content.to_string()).is_some();
            Ok(UploadAck { updated })
        }

        async fn download(&self) -> Result<Option<RemoteSnapshot>, TransportError> {
            self.check()?;
            Ok(self.remote.borrow().clone().map(|content| RemoteSnapshot {
                content,
                modified_time: None,
            }))
        }

        async fn list_revisions(&self) -> Result<Vec<Revision>, TransportError> {
            self.check()?;
            Ok(self.revisions.borrow().iter().map(|(r, _)| r.clone()).collect())
        }

        async fn download_revision(&self, id: &str) -> Result<String, TransportError> {
            self.check()?;
            self.revisions
                .borrow()
                .iter()
                .find(|(r, _)| r.id == id)
                .map(|(_, content)| content.clone())
                .ok_or_else(|| TransportError::NotFound(id.to_string()))
        }
    }

    fn session() -> Session<MemoryKvStore> {
        Session::open(RecordStore::new(MemoryKvStore::new()))
    }

    fn workout(id: i64, session: &str) -> Workout {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        Workout::new(RecordId::new(id), date, session, 1)
    }

    fn orchestrator(transport: FakeTransport) -> SyncOrchestrator<FakeTransport> {
        SyncOrchestrator::new(
            transport,
            BackupScheduler::new(true, Duration::from_secs(3)),
        )
    }

    const REMOTE: &str = r#"{"phase": 2, "workouts": [{"id": 2, "date": "2025-01-02", "session": "B"}], "deletedIds": []}"#;

    #[tokio::test]
    async fn test_pull_merges_and_persists() {
        let sync = orchestrator(FakeTransport::with_remote(REMOTE));
        let mut session = session();
        sync.attach(session.store_mut());
        session.add_workout(workout(1, "A")).unwrap();
        // Let the scheduled backup go out first.
        sync.backup_now(session.graph()).await.unwrap();
        *sync.transport().remote.borrow_mut() = Some(REMOTE.to_string());

        let outcome = sync.on_visible(&mut session).await.unwrap();
        assert_eq!(
            outcome,
            PullOutcome::Merged {
                workouts: 2,
                body_logs: 0
            }
        );
        assert_eq!(session.graph().phase, 2);
        assert_eq!(session.store().load().workouts.len(), 2);
        // The pull's own save does not schedule another backup.
        assert_eq!(sync.state(), BackupState::Idle);
    }

    #[tokio::test]
    async fn test_pull_twice_is_up_to_date() {
        let sync = orchestrator(FakeTransport::with_remote(REMOTE));
        let mut session = session();
        sync.on_visible(&mut session).await.unwrap();
        assert_eq!(
            sync.on_visible(&mut session).await.unwrap(),
            PullOutcome::UpToDate
        );
    }

    #[tokio::test]
    async fn test_pull_disabled_or_without_backup() {
        let disabled = SyncOrchestrator::new(
            FakeTransport::with_remote(REMOTE),
            BackupScheduler::new(false, Duration::from_secs(3)),
        );
        let mut session = session();
        assert_eq!(
            disabled.on_visible(&mut session).await.unwrap(),
            PullOutcome::Disabled
        );

        let empty = orchestrator(FakeTransport::default());
        assert_eq!(
            empty.on_visible(&mut session).await.unwrap(),
            PullOutcome::NoBackup
        );
        assert!(session.graph().workouts.is_empty());
    }

    #[tokio::test]
    async fn test_pull_skipped_while_backup_pending() {
        let sync = orchestrator(FakeTransport::with_remote(REMOTE));
        let mut session = session();
        sync.attach(session.store_mut());
        session.add_workout(workout(1, "A")).unwrap();

        assert_eq!(
            sync.on_visible(&mut session).await.unwrap(),
            PullOutcome::Skipped
        );
        assert_eq!(session.graph().workouts.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_download_leaves_local_untouched() {
        let sync = orchestrator(FakeTransport::with_remote(REMOTE));
        sync.transport().fail.set(Some(Failure::Network));
        let mut session = session();
        session.add_workout(workout(1, "A")).unwrap();
        let before = session.graph().clone();

        assert!(matches!(
            sync.on_visible(&mut session).await,
            Err(SyncError::Network(_))
        ));
        assert_eq!(session.graph(), &before);
        assert_eq!(session.store().load(), before);
        assert!(matches!(sync.state(), BackupState::Failed { .. }));

        sync.transport().fail.set(Some(Failure::Auth));
        assert!(matches!(
            sync.fetch_restore(&before, RestoreSource::Current).await,
            Err(SyncError::Auth(_))
        ));
        assert_eq!(session.store().load(), before);
    }

    #[tokio::test]
    async fn test_invalid_backup_is_rejected_before_merge() {
        let sync = orchestrator(FakeTransport::with_remote(r#"{"phase": 9}"#));
        let mut session = session();
        assert!(matches!(
            sync.on_visible(&mut session).await,
            Err(SyncError::InvalidBackup(_))
        ));
        assert_eq!(session.graph(), &DataGraph::default());
    }

    #[tokio::test]
    async fn test_restore_requires_commit() {
        let sync = orchestrator(FakeTransport::with_remote(REMOTE));
        let mut session = session();
        session.add_workout(workout(1, "A")).unwrap();

        let pending = sync
            .fetch_restore(session.graph(), RestoreSource::Current)
            .await
            .unwrap();
        assert_eq!(pending.workouts, 2);
        assert_eq!(pending.scalar_changes, vec![ScalarField::Phase]);
        assert_eq!(session.graph().workouts.len(), 1);
        assert_eq!(session.store().load().workouts.len(), 1);

        sync.commit_restore(&mut session, pending).unwrap();
        assert_eq!(session.store().load().workouts.len(), 2);
    }

    #[tokio::test]
    async fn test_restore_without_backup() {
        let sync = orchestrator(FakeTransport::default());
        assert!(matches!(
            sync.fetch_restore(&DataGraph::default(), RestoreSource::Current)
                .await,
            Err(SyncError::NoBackup)
        ));
        assert!(matches!(
            sync.fetch_restore(&DataGraph::default(), RestoreSource::Revision("1".into()))
                .await,
            Err(SyncError::RevisionNotFound(id)) if id == "1"
        ));
    }

    #[tokio::test]
    async fn test_restore_from_revision() {
        let transport = FakeTransport::default();
        transport.revisions.borrow_mut().push((
            Revision {
                id: "r1".to_string(),
                modified_time: Utc::now(),
                size: None,
            },
            REMOTE.to_string(),
        ));
        let sync = orchestrator(transport);

        let revisions = sync.revisions().await.unwrap();
        assert_eq!(revisions.len(), 1);

        let pending = sync
            .fetch_restore(&DataGraph::default(), RestoreSource::Revision("r1".into()))
            .await
            .unwrap();
        assert_eq!(pending.merged.workouts[0].session, "B");
    }

    #[tokio::test]
    async fn test_saves_schedule_and_flush_on_hidden() {
        let sync = orchestrator(FakeTransport::default());
        let mut session = session();
        sync.attach(session.store_mut());

        assert!(sync.on_hidden(session.graph()).await.is_none());

        session.add_workout(workout(1, "A")).unwrap();
        assert!(sync.has_pending_backup());

        let result = sync.on_hidden(session.graph()).await.unwrap();
        assert_eq!(result.unwrap(), UploadAck { updated: false });
        assert_eq!(sync.state(), BackupState::Idle);

        let uploaded = sync.transport().uploads.borrow()[0].clone();
        let snapshot = document::parse_snapshot(&uploaded).unwrap();
        assert_eq!(&snapshot, session.graph());
    }

    #[tokio::test]
    async fn test_flush_merged_keeps_other_devices_records() {
        let sync = orchestrator(FakeTransport::with_remote(REMOTE));
        let mut session = session();
        sync.attach(session.store_mut());
        session.add_workout(workout(1, "A")).unwrap();
        session.set_phase(3).unwrap();

        let result = sync.flush_merged(&mut session).await.unwrap();
        assert_eq!(result.unwrap(), UploadAck { updated: true });

        let uploaded = sync.transport().uploads.borrow()[0].clone();
        let snapshot = document::parse_snapshot(&uploaded).unwrap();
        let mut ids: Vec<i64> = snapshot.workouts.iter().map(|w| w.id.as_millis()).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(snapshot.phase, 3);
        assert_eq!(&snapshot, session.graph());
        assert_eq!(session.store().load().workouts.len(), 2);
        assert_eq!(sync.state(), BackupState::Idle);
        assert!(sync.flush_merged(&mut session).await.is_none());
    }

    #[tokio::test]
    async fn test_flush_merged_uploads_nothing_when_offline() {
        let sync = orchestrator(FakeTransport::with_remote(REMOTE));
        let mut session = session();
        sync.attach(session.store_mut());
        session.add_workout(workout(1, "A")).unwrap();
        sync.transport().fail.set(Some(Failure::Network));

        let result = sync.flush_merged(&mut session).await.unwrap();
        assert!(matches!(result, Err(SyncError::Network(_))));
        assert!(sync.transport().uploads.borrow().is_empty());
        assert_eq!(session.graph().workouts.len(), 1);
        assert!(matches!(sync.state(), BackupState::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_backup_waits_for_quiet_period() {
        let sync = orchestrator(FakeTransport::default());
        let mut session = session();
        sync.attach(session.store_mut());

        session.add_workout(workout(1, "A")).unwrap();
        assert!(sync.run_due(session.graph(), Instant::now()).await.is_none());

        let result = sync.wait_and_run(session.graph()).await;
        assert!(result.unwrap().is_ok());
        assert_eq!(sync.transport().uploads.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_backup_keeps_local_and_allows_retry() {
        let sync = orchestrator(FakeTransport::default());
        sync.transport().fail.set(Some(Failure::Network));
        let mut session = session();
        session.add_workout(workout(1, "A")).unwrap();

        assert!(matches!(
            sync.backup_now(session.graph()).await,
            Err(SyncError::Network(_))
        ));
        assert_eq!(session.store().load().workouts.len(), 1);

        sync.transport().fail.set(None);
        assert!(sync.backup_now(session.graph()).await.is_ok());
    }
}
