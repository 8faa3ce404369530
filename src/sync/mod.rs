//! Mirroring application state to the shared remote store.

mod document;
mod gateway;
mod service;
pub mod store;

pub use document::RemoteDocument;
pub use gateway::Gateway;
pub use service::{StartupOutcome, SyncService, SyncSettings};
pub use store::RemoteStore;

use chrono::{DateTime, Utc};
use std::fmt;

/// Discriminator of the single row holding the whole shared state.
pub const FULL_BACKUP: &str = "full_backup";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Syncing,
    Synced,
    Error(String),
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Synced => write!(f, "synced"),
            SyncState::Error(msg) => write!(f, "error: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStatus {
    pub state: SyncState,
    pub last_sync: Option<DateTime<Utc>>,
}

impl SyncStatus {
    pub fn error(&self) -> Option<&str> {
        match &self.state {
            SyncState::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            last_sync: None,
        }
    }
}
