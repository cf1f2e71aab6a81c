//! Durable storage for subscription state.
//!
//! The whole document is rewritten on every change. `JsonFileStorage` writes to a
//! sibling temp file and renames it over the target, so a crash mid-write leaves
//! either the old or the new document on disk, never a torn one.

use std::io::ErrorKind;
use std::path::PathBuf;

use hourbell_common::types::{SubscriptionDocument, SubscriptionSet};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed subscription document: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Blocking load/save of the full subscription set.
///
/// Callers on the async runtime must invoke these from a blocking context.
pub trait SubscriptionStorage: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<SubscriptionSet>, StorageError>;

    fn save(&self, set: &SubscriptionSet) -> Result<(), StorageError>;
}

/// Subscription document stored as pretty-printed JSON on the local filesystem.
#[derive(Debug, Clone)]
pub struct JsonFileStorage {
    path: PathBuf,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SubscriptionStorage for JsonFileStorage {
    fn load(&self) -> Result<Option<SubscriptionSet>, StorageError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let document: SubscriptionDocument = serde_json::from_slice(&bytes)?;
        Ok(Some(document.into()))
    }

    fn save(&self, set: &SubscriptionSet) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(&SubscriptionDocument::from(set))?;
        let temp = self.temp_path();
        std::fs::write(&temp, json)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }
}
