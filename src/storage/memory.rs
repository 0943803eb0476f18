//! In-process storage backend

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::{Batch, KeyQuery, Record, StorageBackend};
use crate::error::StorageError;

/// Storage held in memory; `apply` is atomic
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<Record>,
    fail_writes: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: Record) -> Self {
        Self {
            data: Mutex::new(record),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Copy of everything currently stored
    pub async fn snapshot(&self) -> Record {
        self.data.lock().await.clone()
    }

    /// Make every subsequent write fail as if the backend were unavailable
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("memory storage is read-only".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn get(&self, query: KeyQuery) -> Result<Record, StorageError> {
        Ok(query.select(&*self.data.lock().await))
    }

    async fn set(&self, record: Record) -> Result<(), StorageError> {
        self.check_writable()?;
        self.data.lock().await.extend(record);
        Ok(())
    }

    async fn remove(&self, keys: Vec<String>) -> Result<(), StorageError> {
        self.check_writable()?;
        let mut data = self.data.lock().await;
        for key in keys {
            data.remove(&key);
        }
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.check_writable()?;
        self.data.lock().await.clear();
        Ok(())
    }

    async fn apply(&self, batch: Batch) -> Result<(), StorageError> {
        self.check_writable()?;
        batch.apply_to(&mut *self.data.lock().await);
        Ok(())
    }
}
