//! Shared persistent catalog.
//!
//! The catalog is the single durable list of [`DocumentRecord`]s and the only
//! channel between the upload and library contexts. It sits on top of an
//! origin-scoped string key-value [`Storage`] (the same shape as browser
//! local storage): the whole record list is serialized as one JSON array
//! under a well-known key.
//!
//! Writes are full overwrites. Two contexts writing at once is a
//! last-writer-wins race; nothing here coordinates them.
//!
//! # Backends
//!
//! | Backend | Use |
//! |---------|-----|
//! | [`MemoryStorage`] | tests and single-process servers |
//! | [`SqliteStorage`] | durable storage shareable between processes |

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::models::DocumentRecord;

/// Origin-scoped string key-value storage.
///
/// Implementations must be `Send + Sync`; every context holding a handle to
/// the same storage observes the same values.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent.
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Deletes `key`. Deleting an absent key is not an error.
    async fn remove_item(&self, key: &str) -> Result<()>;
}

/// Why a catalog read could not produce a record list.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog payload under '{key}' is corrupt: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("catalog storage unavailable: {0:#}")]
    Storage(anyhow::Error),
}

/// A context's handle on the shared catalog.
///
/// Cheap to clone. Each context builds its own handle; only the underlying
/// storage is shared.
#[derive(Clone)]
pub struct Catalog {
    storage: Arc<dyn Storage>,
    key: String,
}

impl Catalog {
    pub fn new(storage: Arc<dyn Storage>, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Reads the record list, distinguishing corruption from absence.
    ///
    /// An absent key yields an empty list.
    pub async fn try_load(&self) -> Result<Vec<DocumentRecord>, CatalogError> {
        let payload = self
            .storage
            .get_item(&self.key)
            .await
            .map_err(CatalogError::Storage)?;

        match payload {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(|source| CatalogError::Corrupt {
                key: self.key.clone(),
                source,
            }),
        }
    }

    /// Reads the record list, substituting an empty list for any failure.
    pub async fn load(&self) -> Vec<DocumentRecord> {
        match self.try_load().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "treating catalog as empty");
                Vec::new()
            }
        }
    }

    /// Overwrites the catalog with `records`.
    pub async fn save(&self, records: &[DocumentRecord]) -> Result<()> {
        let payload = serde_json::to_string(records)?;
        self.storage.set_item(&self.key, &payload).await
    }

    /// Removes the catalog key entirely.
    pub async fn clear(&self) -> Result<()> {
        self.storage.remove_item(&self.key).await
    }
}
