use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::RwLock;

use super::RemoteStore;
use crate::error::RemoteError;

/// In-process store, public as a test double for code built on
/// [`SyncService`](crate::sync::SyncService). Nothing is persisted.
///
/// It can be switched offline, made to reject writes, or made to stall
/// individual writes. Every written document is kept in order for
/// inspection.
#[derive(Default)]
pub struct MemoryStore {
    rows: RwLock<HashMap<String, Value>>,
    writes: RwLock<Vec<Value>>,
    offline: AtomicBool,
    fail_writes: AtomicBool,
    delays: Mutex<VecDeque<Duration>>,
    inserts: AtomicUsize,
    updates: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_row(data_type: &str, data: Value) -> Self {
        let store = Self::default();
        if let Ok(mut rows) = store.rows.try_write() {
            rows.insert(data_type.to_string(), data);
        }
        store
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.offline.store(!reachable, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The next write sleeps for `delay` before it lands. Queued delays are
    /// consumed in write order.
    pub fn delay_next_write(&self, delay: Duration) {
        if let Ok(mut delays) = self.delays.lock() {
            delays.push_back(delay);
        }
    }

    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Every document written so far, oldest first.
    pub async fn writes(&self) -> Vec<Value> {
        self.writes.read().await.clone()
    }

    pub async fn current(&self, data_type: &str) -> Option<Value> {
        self.rows.read().await.get(data_type).cloned()
    }

    fn check_reachable(&self) -> Result<(), RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RemoteError::Transport("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    async fn write(&self, data_type: &str, data: Value) -> Result<(), RemoteError> {
        self.check_reachable()?;
        let delay = self.delays.lock().ok().and_then(|mut d| d.pop_front());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Status {
                status: 500,
                body: "write rejected".to_string(),
            });
        }
        self.writes.write().await.push(data.clone());
        self.rows.write().await.insert(data_type.to_string(), data);
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn probe(&self) -> Result<(), RemoteError> {
        self.check_reachable()
    }

    async fn select(&self, data_type: &str) -> Result<Option<Value>, RemoteError> {
        self.check_reachable()?;
        Ok(self.current(data_type).await)
    }

    async fn insert(&self, data_type: &str, data: Value) -> Result<(), RemoteError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.write(data_type, data).await
    }

    async fn update(&self, data_type: &str, data: Value) -> Result<(), RemoteError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.write(data_type, data).await
    }
}
