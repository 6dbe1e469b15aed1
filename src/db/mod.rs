//! Credential storage.
//!
//! The whole user list is one [`Snapshot`]: read fully, mutated in memory and
//! written back fully. [`UserStore`] is the seam for swapping the flat-file
//! backend for something else.

mod json_file;
mod models;

pub use json_file::JsonFileStore;
pub use models::*;

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while persisting the snapshot
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize snapshot: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to replace store file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("refusing to replace unreadable store {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("store task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Read the persisted snapshot. Missing or unreadable data yields an empty snapshot.
    async fn load(&self) -> Snapshot;

    /// Replace the persisted snapshot with `snapshot`.
    async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError>;
}

pub type DynUserStore = Arc<dyn UserStore>;
