//! Single-document JSON persistence.
//!
//! The device cache is one JSON document rewritten wholesale on every
//! mutation. Writes go through a temporary file and rename so a crash never
//! leaves a truncated document behind.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::fs;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Handle to one JSON document on disk.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    pub fn new(dir: impl AsRef<Path>, name: &str) -> Self {
        Self {
            path: dir.as_ref().join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the document, returning None if it does not exist yet.
    pub async fn load<T>(&self) -> Result<Option<T>, StoreError>
    where
        T: DeserializeOwned,
    {
        let contents = match fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Store document not found: {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(serde_json::from_str(&contents)?))
    }

    /// Save the document, replacing whatever is there.
    pub async fn save<T>(&self, data: &T) -> Result<(), StoreError>
    where
        T: Serialize,
    {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let contents = serde_json::to_string_pretty(data)?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!("Saved store document: {:?}", self.path);
        Ok(())
    }

    /// Delete the document. Missing documents are not an error.
    pub async fn remove(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Spawn the background writer that mirrors snapshots to disk.
///
/// Snapshots arrive on a watch channel, so a burst of mutations collapses
/// into a single write: at most one write is in flight and only the newest
/// snapshot is persisted. Write failures are logged and not retried; the
/// next mutation produces a fresh snapshot anyway.
pub fn spawn_writer<T>(store: Store, mut rx: watch::Receiver<Option<T>>) -> JoinHandle<()>
where
    T: Serialize + Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            if let Some(data) = snapshot {
                if let Err(e) = store.save(&data).await {
                    warn!("Failed to persist store document {:?}: {}", store.path(), e);
                }
            }
        }
        debug!("Store writer exiting: {:?}", store.path());
    })
}
