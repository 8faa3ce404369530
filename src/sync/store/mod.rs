//! Remote table abstraction: rows of JSON documents keyed by a `data_type`
//! discriminator.

mod file;
mod memory;
mod rest;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use rest::RestStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RemoteError;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Cheap reachability check.
    async fn probe(&self) -> Result<(), RemoteError>;

    /// The `data` column of the row with this discriminator, if any.
    async fn select(&self, data_type: &str) -> Result<Option<Value>, RemoteError>;

    async fn insert(&self, data_type: &str, data: Value) -> Result<(), RemoteError>;

    async fn update(&self, data_type: &str, data: Value) -> Result<(), RemoteError>;
}
