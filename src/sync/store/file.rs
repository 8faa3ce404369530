use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::RemoteStore;
use crate::error::RemoteError;

/// One row of the shared table, mirroring the hosted schema.
#[derive(Debug, Serialize, Deserialize)]
struct Row {
    id: String,
    data_type: String,
    data: Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Shared table kept in a JSON file, typically on a network drive.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_rows(&self) -> Result<Vec<Row>, RemoteError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if text.trim().is_empty() => Ok(Vec::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| {
                RemoteError::Decode(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write to a sibling temp file then rename over the target.
    async fn write_rows(&self, rows: &[Row]) -> Result<(), RemoteError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let text = serde_json::to_string_pretty(rows)
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, text).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for FileStore {
    async fn probe(&self) -> Result<(), RemoteError> {
        match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) if !dir.is_dir() => Err(RemoteError::Transport(format!(
                "directory {} does not exist",
                dir.display()
            ))),
            _ => self.read_rows().await.map(|_| ()),
        }
    }

    async fn select(&self, data_type: &str) -> Result<Option<Value>, RemoteError> {
        Ok(self
            .read_rows()
            .await?
            .into_iter()
            .find(|row| row.data_type == data_type)
            .map(|row| row.data)
            .filter(|data| !data.is_null()))
    }

    async fn insert(&self, data_type: &str, data: Value) -> Result<(), RemoteError> {
        let mut rows = self.read_rows().await?;
        let now = Utc::now();
        rows.push(Row {
            id: uuid::Uuid::new_v4().to_string(),
            data_type: data_type.to_string(),
            data,
            created_at: now,
            updated_at: now,
        });
        self.write_rows(&rows).await
    }

    async fn update(&self, data_type: &str, data: Value) -> Result<(), RemoteError> {
        let mut rows = self.read_rows().await?;
        let now = Utc::now();
        for row in rows.iter_mut().filter(|r| r.data_type == data_type) {
            row.data = data.clone();
            row.updated_at = now;
        }
        self.write_rows(&rows).await
    }
}
