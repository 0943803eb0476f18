//! Storage backend persisted as a single JSON object file

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{Batch, KeyQuery, Record, StorageBackend};
use crate::error::StorageError;

/// JSON file storage
///
/// Every write replaces the whole file through a temp file and a rename,
/// so a reader never sees a half-written state and `apply` is atomic.
#[derive(Debug)]
pub struct JsonFileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Record, StorageError> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(Record::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Storage file missing, starting empty");
                Ok(Record::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn persist(&self, data: &Record) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_vec_pretty(data)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), keys = data.len(), "Storage file written");
        Ok(())
    }

    async fn modify(&self, f: impl FnOnce(&mut Record) + Send) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        f(&mut data);
        self.persist(&data).await
    }
}

#[async_trait]
impl StorageBackend for JsonFileStorage {
    async fn get(&self, query: KeyQuery) -> Result<Record, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(query.select(&self.load().await?))
    }

    async fn set(&self, record: Record) -> Result<(), StorageError> {
        self.modify(move |data| data.extend(record)).await
    }

    async fn remove(&self, keys: Vec<String>) -> Result<(), StorageError> {
        self.modify(move |data| {
            for key in &keys {
                data.remove(key);
            }
        })
        .await
    }

    async fn clear(&self) -> Result<(), StorageError> {
        info!(path = %self.path.display(), "Clearing storage");
        self.modify(|data| data.clear()).await
    }

    async fn apply(&self, batch: Batch) -> Result<(), StorageError> {
        self.modify(move |data| batch.apply_to(data)).await
    }
}
