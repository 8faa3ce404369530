use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::document::RemoteDocument;
use super::store::RemoteStore;
use super::{SyncState, SyncStatus, FULL_BACKUP};
use crate::error::{CrmError, FormatError, RemoteError};
use crate::state::AppState;

/// Reads and writes the whole application state as a single remote row, and
/// tracks the outcome of the last operation.
pub struct Gateway {
    store: Arc<dyn RemoteStore>,
    data_type: String,
    status: watch::Sender<SyncStatus>,
}

impl Gateway {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self::with_data_type(store, FULL_BACKUP)
    }

    pub fn with_data_type(store: Arc<dyn RemoteStore>, data_type: &str) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            store,
            data_type: data_type.to_string(),
            status,
        }
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    fn set_state(&self, state: SyncState) {
        self.status.send_modify(|s| {
            if state == SyncState::Synced {
                s.last_sync = Some(Utc::now());
            }
            s.state = state;
        });
    }

    /// Upsert the state document: update the existing row, or insert one.
    pub async fn save(&self, state: &AppState) -> Result<(), RemoteError> {
        self.set_state(SyncState::Syncing);
        match self.upsert(state).await {
            Ok(()) => {
                info!(
                    projects = state.projects.len(),
                    quotes = state.quotes.len(),
                    "saved state to remote store"
                );
                self.set_state(SyncState::Synced);
                Ok(())
            }
            Err(e) => {
                error!("save to remote store failed: {e}");
                self.set_state(SyncState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn upsert(&self, state: &AppState) -> Result<(), RemoteError> {
        // serde_json writes NaN and infinity as null, which no client can load back.
        if let Some((quote, field)) = state.non_finite_quote() {
            return Err(RemoteError::Unencodable(format!(
                "quote {} has a non-finite {field}",
                quote.id
            )));
        }
        let doc = RemoteDocument::from_state(state, Utc::now());
        let data =
            serde_json::to_value(&doc).map_err(|e| RemoteError::Unencodable(e.to_string()))?;

        if self.store.select(&self.data_type).await?.is_some() {
            debug!(data_type = %self.data_type, "updating existing row");
            self.store.update(&self.data_type, data).await
        } else {
            debug!(data_type = %self.data_type, "inserting new row");
            self.store.insert(&self.data_type, data).await
        }
    }

    /// The stored state, or `None` when no row exists yet.
    pub async fn load(&self) -> Result<Option<AppState>, CrmError> {
        self.set_state(SyncState::Syncing);
        match self.fetch().await {
            Ok(state) => {
                self.set_state(SyncState::Synced);
                Ok(state)
            }
            Err(e) => {
                error!("load from remote store failed: {e}");
                self.set_state(SyncState::Error(e.to_string()));
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<Option<AppState>, CrmError> {
        let Some(data) = self.store.select(&self.data_type).await? else {
            return Ok(None);
        };
        if !data.is_object() {
            return Err(FormatError::Shape("remote document is not an object".to_string()).into());
        }
        let doc: RemoteDocument = serde_json::from_value(data).map_err(FormatError::from)?;
        Ok(Some(doc.into_state(Utc::now())))
    }

    /// Reachability probe. Leaves the sync status alone.
    pub async fn test_connection(&self) -> bool {
        match self.store.probe().await {
            Ok(()) => true,
            Err(e) => {
                debug!("connection test failed: {e}");
                false
            }
        }
    }
}
