//! Asynchronous key/value storage backends
//!
//! The core only talks to storage through [`StorageBackend`]; every call is
//! awaited before the operation that issued it is considered complete.

pub mod file;
pub mod layout;
pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::StorageError;

pub use file::JsonFileStorage;
pub use memory::MemoryStorage;

/// Flat key space: one JSON value per key
pub type Record = Map<String, Value>;

/// Which keys a `get` should return
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyQuery {
    All,
    Keys(Vec<String>),
}

impl KeyQuery {
    pub fn key(key: impl Into<String>) -> Self {
        KeyQuery::Keys(vec![key.into()])
    }

    pub(crate) fn select(&self, data: &Record) -> Record {
        match self {
            KeyQuery::All => data.clone(),
            KeyQuery::Keys(keys) => keys
                .iter()
                .filter_map(|k| data.get(k).map(|v| (k.clone(), v.clone())))
                .collect(),
        }
    }
}

/// A set of writes and removals that belong to one logical operation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    pub set: Record,
    pub remove: Vec<String>,
}

impl Batch {
    pub fn put(mut self, key: impl Into<String>, value: Value) -> Self {
        self.set.insert(key.into(), value);
        self
    }

    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.remove.push(key.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.remove.is_empty()
    }

    pub(crate) fn apply_to(self, data: &mut Record) {
        for (key, value) in self.set {
            data.insert(key, value);
        }
        for key in self.remove {
            data.remove(&key);
        }
    }
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn get(&self, query: KeyQuery) -> Result<Record, StorageError>;

    async fn set(&self, record: Record) -> Result<(), StorageError>;

    async fn remove(&self, keys: Vec<String>) -> Result<(), StorageError>;

    async fn clear(&self) -> Result<(), StorageError>;

    /// Write then remove. Backends that can commit both in one step
    /// override this so the batch is all-or-nothing.
    async fn apply(&self, batch: Batch) -> Result<(), StorageError> {
        if !batch.set.is_empty() {
            self.set(batch.set).await?;
        }
        if !batch.remove.is_empty() {
            self.remove(batch.remove).await?;
        }
        Ok(())
    }
}
