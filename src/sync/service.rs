use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::gateway::Gateway;
use super::SyncStatus;
use crate::backup::BackupEnvelope;
use crate::error::{IntegrityError, RemoteError};
use crate::state::{guard, reduce, Action, AppState};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    /// Quiet period after the last mutation before an autosave fires.
    pub debounce: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupOutcome {
    /// Remote state replaced the local one.
    Loaded,
    /// Remote store reachable but holds nothing; local state kept.
    Empty,
    Unreachable,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SaveMode {
    /// Debounced autosave: only unsaved, non-empty state.
    Auto,
    /// Only if there are unsaved local commits.
    Dirty,
    Forced,
}

struct Committed {
    state: AppState,
    /// Bumped on every mutating dispatch.
    revision: u64,
}

struct Inner {
    committed: Mutex<Committed>,
    gateway: Gateway,
    debounce: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
    /// Write lock for the remote row; holds the last revision written.
    persisted: tokio::sync::Mutex<u64>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owns the application state, applies actions to it and keeps the remote
/// copy up to date.
///
/// Methods that schedule background work must be called from inside a Tokio
/// runtime.
#[derive(Clone)]
pub struct SyncService {
    inner: Arc<Inner>,
}

impl SyncService {
    pub fn new(gateway: Gateway, settings: SyncSettings) -> Self {
        Self::with_state(gateway, settings, AppState::default())
    }

    pub fn with_state(gateway: Gateway, settings: SyncSettings, state: AppState) -> Self {
        Self {
            inner: Arc::new(Inner {
                committed: Mutex::new(Committed { state, revision: 0 }),
                gateway,
                debounce: settings.debounce,
                timer: Mutex::new(None),
                persisted: tokio::sync::Mutex::new(0),
            }),
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> AppState {
        lock(&self.inner.committed).state.clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        f(&lock(&self.inner.committed).state)
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.inner.gateway.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.inner.gateway.subscribe()
    }

    pub fn gateway(&self) -> &Gateway {
        &self.inner.gateway
    }

    /// Apply an action. Mutations restart the autosave timer; `ForceSave`
    /// starts an immediate save in the background.
    pub fn dispatch(&self, action: Action) {
        let unchecked = self.apply(action, |_, _| Ok(()));
        debug_assert!(unchecked.is_ok());
    }

    /// Like `dispatch`, but runs the integrity checks first against the same
    /// state the action is applied to. A rejected action changes nothing.
    pub fn try_dispatch(&self, action: Action) -> Result<(), IntegrityError> {
        self.apply(action, guard::check)
    }

    fn apply(
        &self,
        action: Action,
        check: impl FnOnce(&AppState, &Action) -> Result<(), IntegrityError>,
    ) -> Result<(), IntegrityError> {
        let name = action.name();
        let mutation = action.is_mutation();
        let forced = matches!(action, Action::ForceSave);
        {
            let mut committed = lock(&self.inner.committed);
            check(&committed.state, &action)?;
            let current = std::mem::take(&mut committed.state);
            committed.state = reduce(current, action);
            if mutation {
                committed.revision += 1;
            }
        }
        debug!(action = name, "dispatched");

        if mutation {
            self.schedule_autosave();
        }
        if forced {
            let inner = self.inner.clone();
            tokio::spawn(async move {
                if let Err(e) = persist(&inner, SaveMode::Forced).await {
                    warn!("forced save failed: {e}");
                }
            });
        }
        Ok(())
    }

    fn schedule_autosave(&self) {
        let mut timer = lock(&self.inner.timer);
        if let Some(previous) = timer.take() {
            previous.abort();
        }
        let inner = self.inner.clone();
        let debounce = inner.debounce;
        debug!(?debounce, "autosave scheduled");
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            // The save outlives this timer so that a later reschedule cannot
            // cancel a write halfway through.
            tokio::spawn(async move {
                match persist(&inner, SaveMode::Auto).await {
                    Ok(true) => {}
                    Ok(false) => debug!("autosave skipped, nothing to write"),
                    Err(e) => debug!("autosave failed: {e}"),
                }
            });
        }));
    }

    fn cancel_autosave(&self) {
        if let Some(timer) = lock(&self.inner.timer).take() {
            timer.abort();
        }
    }

    /// Probe the remote store and adopt its state when it has any.
    pub async fn startup(&self) -> StartupOutcome {
        let gateway = &self.inner.gateway;
        if !gateway.test_connection().await {
            warn!("remote store unreachable, working on local state only");
            return StartupOutcome::Unreachable;
        }

        let mut persisted = self.inner.persisted.lock().await;
        match gateway.load().await {
            Ok(Some(remote)) if remote.has_data() => {
                info!(
                    projects = remote.projects.len(),
                    quotes = remote.quotes.len(),
                    sales_reps = remote.sales_reps.len(),
                    companies = remote.companies.len(),
                    "loaded state from remote store"
                );
                let mut committed = lock(&self.inner.committed);
                let current = std::mem::take(&mut committed.state);
                committed.state = reduce(current, Action::LoadFromDatabase(Box::new(remote)));
                *persisted = committed.revision;
                StartupOutcome::Loaded
            }
            Ok(_) => {
                info!("remote store is empty, keeping local state");
                StartupOutcome::Empty
            }
            Err(e) => StartupOutcome::Failed(e.to_string()),
        }
    }

    /// Save the latest state now and report the outcome.
    pub async fn force_save(&self) -> Result<(), RemoteError> {
        persist(&self.inner, SaveMode::Forced).await.map(|_| ())
    }

    /// Best-effort save of the latest state; failures are only logged.
    pub async fn flush(&self) {
        if let Err(e) = persist(&self.inner, SaveMode::Forced).await {
            warn!("flush failed: {e}");
        }
    }

    /// Stop the autosave timer and write any local commits not yet saved.
    pub async fn shutdown(&self) {
        self.cancel_autosave();
        if let Err(e) = persist(&self.inner, SaveMode::Dirty).await {
            warn!("final save failed: {e}");
        }
    }

    /// Whether some local commit has not reached the remote store yet.
    pub async fn has_unsaved_changes(&self) -> bool {
        let persisted = *self.inner.persisted.lock().await;
        lock(&self.inner.committed).revision != persisted
    }

    /// Write `state` to the remote store, then the latest committed state if
    /// it is newer than `state`.
    pub async fn save_to_database(&self, state: &AppState) -> Result<(), RemoteError> {
        let mut persisted = self.inner.persisted.lock().await;
        self.inner.gateway.save(state).await?;

        let (latest, revision) = {
            let committed = lock(&self.inner.committed);
            (committed.state.clone(), committed.revision)
        };
        if latest == *state {
            *persisted = revision;
        } else if latest.last_modified > state.last_modified {
            debug!("local state moved on during save, writing it too");
            self.inner.gateway.save(&latest).await?;
            *persisted = revision;
        }
        Ok(())
    }

    /// Replace the collections with the backup's and save immediately.
    pub async fn import_backup(&self, envelope: BackupEnvelope) -> Result<(), RemoteError> {
        self.dispatch(Action::RestoreBackup(envelope));
        self.force_save().await
    }
}

/// Write the latest committed state, one writer at a time. Returns whether a
/// write happened.
async fn persist(inner: &Inner, mode: SaveMode) -> Result<bool, RemoteError> {
    let mut persisted = inner.persisted.lock().await;
    let (snapshot, revision) = {
        let committed = lock(&inner.committed);
        (committed.state.clone(), committed.revision)
    };

    let dirty = revision != *persisted;
    let skip = match mode {
        SaveMode::Auto => !dirty || !snapshot.has_data(),
        SaveMode::Dirty => !dirty,
        SaveMode::Forced => false,
    };
    if skip {
        return Ok(false);
    }

    inner.gateway.save(&snapshot).await?;
    *persisted = revision;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup;
    use crate::model::{FilterPatch, Project, Quote, QuoteDraft, QuoteStatus};
    use crate::sync::store::MemoryStore;
    use crate::sync::{RemoteDocument, SyncState, FULL_BACKUP};
    use chrono::Utc;
    use serde_json::Value;
    use tokio::time::sleep;

    const DEBOUNCE: Duration = Duration::from_millis(40);

    fn service(store: &Arc<MemoryStore>) -> SyncService {
        SyncService::new(
            Gateway::new(store.clone()),
            SyncSettings { debounce: DEBOUNCE },
        )
    }

    fn project(name: &str) -> Project {
        Project::new(name, "1 rue A", None, Utc::now())
    }

    fn project_count(doc: &Value) -> usize {
        doc["projects"].as_array().map_or(0, |p| p.len())
    }

    async fn settle() {
        sleep(DEBOUNCE * 4).await;
    }

    #[tokio::test]
    async fn rapid_mutations_coalesce_into_one_save() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        for name in ["A", "B", "C"] {
            svc.dispatch(Action::AddProject(project(name)));
            sleep(Duration::from_millis(5)).await;
        }
        settle().await;

        let writes = store.writes().await;
        assert_eq!(writes.len(), 1);
        assert_eq!(project_count(&writes[0]), 3);
        assert_eq!(svc.sync_status().state, SyncState::Synced);
        assert!(!svc.has_unsaved_changes().await);
    }

    #[tokio::test]
    async fn loading_remote_state_does_not_trigger_a_save() {
        let mut remote = AppState::default();
        remote.projects.push(project("Villa"));
        let doc = serde_json::to_value(RemoteDocument::from_state(&remote, Utc::now())).unwrap();
        let store = Arc::new(MemoryStore::with_row(FULL_BACKUP, doc));
        let svc = service(&store);

        assert_eq!(svc.startup().await, StartupOutcome::Loaded);
        settle().await;

        assert_eq!(svc.state().projects, remote.projects);
        assert_eq!((store.inserts(), store.updates()), (0, 0));
        svc.shutdown().await;
        assert_eq!(store.updates(), 0);
    }

    #[tokio::test]
    async fn empty_state_is_never_autosaved() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        svc.dispatch(Action::SetFilters(FilterPatch {
            status: Some(Some(QuoteStatus::Billed)),
            ..FilterPatch::default()
        }));
        settle().await;
        assert!(store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn failed_save_keeps_local_state_and_reports_error() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let svc = service(&store);
        svc.dispatch(Action::AddProject(project("Villa")));
        settle().await;

        assert_eq!(svc.state().projects.len(), 1);
        assert!(svc.sync_status().error().is_some());
        assert!(svc.force_save().await.is_err());
        assert!(svc.has_unsaved_changes().await);
    }

    #[tokio::test]
    async fn slow_first_write_cannot_overwrite_a_newer_one() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        store.delay_next_write(Duration::from_millis(150));

        svc.dispatch(Action::AddProject(project("A")));
        let first = {
            let svc = svc.clone();
            tokio::spawn(async move { svc.force_save().await })
        };
        sleep(Duration::from_millis(20)).await;

        svc.dispatch(Action::AddProject(project("B")));
        svc.force_save().await.unwrap();
        first.await.unwrap().unwrap();
        settle().await;

        let current = store.current(FULL_BACKUP).await.unwrap();
        assert_eq!(project_count(&current), 2);
        let writes = store.writes().await;
        assert_eq!(project_count(&writes[0]), 1);
        assert_eq!(project_count(writes.last().unwrap()), 2);
    }

    #[tokio::test]
    async fn save_to_database_follows_up_with_newer_state() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        svc.dispatch(Action::AddProject(project("A")));
        let older = svc.state();
        sleep(Duration::from_millis(5)).await;
        svc.dispatch(Action::AddProject(project("B")));

        svc.save_to_database(&older).await.unwrap();

        let writes = store.writes().await;
        assert_eq!(writes.len(), 2);
        assert_eq!(project_count(&writes[0]), 1);
        assert_eq!(project_count(&writes[1]), 2);
        settle().await;
        assert_eq!(store.writes().await.len(), 2);
    }

    #[tokio::test]
    async fn startup_reports_unreachable_and_empty() {
        let store = Arc::new(MemoryStore::new());
        store.set_reachable(false);
        let svc = service(&store);
        assert_eq!(svc.startup().await, StartupOutcome::Unreachable);

        store.set_reachable(true);
        svc.dispatch(Action::AddProject(project("Local")));
        assert_eq!(svc.startup().await, StartupOutcome::Empty);
        assert_eq!(svc.state().projects.len(), 1);
    }

    #[tokio::test]
    async fn startup_with_unreadable_document_fails() {
        let store = Arc::new(MemoryStore::with_row(FULL_BACKUP, Value::from(42)));
        let svc = service(&store);
        assert!(matches!(svc.startup().await, StartupOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn rejected_action_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        let villa = project("Villa");
        svc.dispatch(Action::AddProject(villa.clone()));
        svc.dispatch(Action::AddQuote(Quote::create(
            QuoteDraft {
                project_id: villa.id.clone(),
                company_name: "Acme".to_string(),
                amount_ht: 1000.0,
                status: QuoteStatus::Billed,
                equation_rate: 5.0,
                sales_rep_rate: 40.0,
                notes: None,
                date: None,
            },
            Utc::now(),
        )));
        let before = svc.state();

        let err = svc.try_dispatch(Action::DeleteProject(villa.id)).unwrap_err();
        assert!(matches!(err, IntegrityError::ProjectHasQuotes(_)));
        assert_eq!(svc.state(), before);
    }

    #[tokio::test]
    async fn shutdown_writes_pending_changes_only() {
        let store = Arc::new(MemoryStore::new());
        let svc = SyncService::new(
            Gateway::new(store.clone()),
            SyncSettings {
                debounce: Duration::from_secs(30),
            },
        );
        svc.shutdown().await;
        assert!(store.writes().await.is_empty());

        svc.dispatch(Action::AddProject(project("Villa")));
        svc.shutdown().await;
        assert_eq!(store.writes().await.len(), 1);
        svc.shutdown().await;
        assert_eq!(store.writes().await.len(), 1);
    }

    #[tokio::test]
    async fn force_save_action_writes_even_empty_state() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        svc.dispatch(Action::ForceSave);
        settle().await;
        assert_eq!(store.inserts(), 1);
    }

    #[tokio::test]
    async fn upsert_inserts_once_then_updates() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        svc.dispatch(Action::AddProject(project("A")));
        svc.force_save().await.unwrap();
        svc.dispatch(Action::AddProject(project("B")));
        svc.force_save().await.unwrap();
        assert_eq!((store.inserts(), store.updates()), (1, 1));
    }

    #[tokio::test]
    async fn import_backup_replaces_and_saves() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        svc.dispatch(Action::AddProject(project("Old")));

        let mut source = AppState::default();
        source.projects.push(project("New"));
        source.projects.push(project("Newer"));
        let text = backup::to_json(&backup::encode(&source, Utc::now())).unwrap();

        svc.import_backup(backup::decode(&text).unwrap()).await.unwrap();
        assert_eq!(svc.state().projects, source.projects);
        let current = store.current(FULL_BACKUP).await.unwrap();
        assert_eq!(project_count(&current), 2);
    }

    #[tokio::test]
    async fn flush_writes_even_when_nothing_is_pending() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        svc.dispatch(Action::AddProject(project("Villa")));
        svc.force_save().await.unwrap();
        assert!(!svc.has_unsaved_changes().await);

        svc.flush().await;
        let writes = store.writes().await;
        assert_eq!(writes.len(), 2);
        assert_eq!(project_count(&writes[1]), 1);
    }

    #[tokio::test]
    async fn flush_writes_empty_state() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        svc.flush().await;
        assert_eq!(store.inserts(), 1);
        let current = store.current(FULL_BACKUP).await.unwrap();
        assert_eq!(project_count(&current), 0);
        assert_eq!(svc.sync_status().state, SyncState::Synced);
    }

    #[tokio::test]
    async fn failed_flush_is_logged_and_keeps_local_state() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_writes(true);
        let svc = SyncService::new(
            Gateway::new(store.clone()),
            SyncSettings {
                debounce: Duration::from_secs(30),
            },
        );
        svc.dispatch(Action::AddProject(project("Villa")));

        svc.flush().await;
        assert!(svc.sync_status().error().unwrap().contains("write rejected"));
        assert_eq!(svc.state().projects.len(), 1);
        assert!(svc.has_unsaved_changes().await);
        assert!(store.writes().await.is_empty());
    }

    #[tokio::test]
    async fn status_subscribers_follow_saves() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        let mut rx = svc.subscribe_status();
        let wait = Duration::from_secs(2);

        store.delay_next_write(Duration::from_millis(100));
        svc.dispatch(Action::AddProject(project("Villa")));
        tokio::time::timeout(wait, rx.changed()).await.unwrap().unwrap();
        assert_eq!(rx.borrow_and_update().state, SyncState::Syncing);
        tokio::time::timeout(wait, rx.changed()).await.unwrap().unwrap();
        let synced = rx.borrow_and_update().clone();
        assert_eq!(synced.state, SyncState::Synced);
        assert!(synced.last_sync.is_some());

        store.set_fail_writes(true);
        assert!(svc.force_save().await.is_err());
        assert!(rx.has_changed().unwrap());
        let failed = rx.borrow_and_update().clone();
        assert!(failed.error().unwrap().contains("500"));
        assert_eq!(failed.last_sync, synced.last_sync);
    }

    #[tokio::test]
    async fn non_finite_quote_is_refused_and_remote_stays_loadable() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(&store);
        let villa = project("Villa");
        svc.dispatch(Action::AddProject(villa.clone()));
        svc.force_save().await.unwrap();

        svc.dispatch(Action::AddQuote(Quote::create(
            QuoteDraft {
                project_id: villa.id.clone(),
                company_name: "Acme".to_string(),
                amount_ht: 1000.0,
                status: QuoteStatus::Billed,
                equation_rate: f64::INFINITY,
                sales_rep_rate: 40.0,
                notes: None,
                date: None,
            },
            Utc::now(),
        )));
        let err = svc.force_save().await.unwrap_err();
        assert!(matches!(err, RemoteError::Unencodable(_)));

        let other = service(&store);
        assert_eq!(other.startup().await, StartupOutcome::Loaded);
        assert_eq!(other.state().projects, vec![villa]);
        assert!(other.state().quotes.is_empty());
    }
}
