//! Worker status store.
//!
//! One record per live worker under `res_mgr:worker:<id>`, holding the
//! JSON document `{"status": "..."}`. Records carry no TTL; removing a
//! worker deletes its record.

use crate::error::{Result, WorkerError};
use async_trait::async_trait;
use jagereye_protocol::{WorkerId, WorkerRecord, WorkerStatus};
use std::collections::HashMap;
use std::sync::RwLock;

/// Key prefix of worker status records.
pub const KEY_PREFIX: &str = "res_mgr:worker:";

/// Returns the store key of a worker under `prefix`.
#[must_use]
pub fn worker_key(prefix: &str, id: &WorkerId) -> String {
    format!("{prefix}{id}")
}

/// Key/value store of worker status records.
///
/// Writes are last-writer-wins per key.
#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Writes the record of a worker.
    async fn set(&self, id: &WorkerId, record: &WorkerRecord) -> Result<()>;

    /// Reads the record of a worker.
    async fn get(&self, id: &WorkerId) -> Result<Option<WorkerRecord>>;

    /// Deletes the record of a worker.
    ///
    /// Returns whether a record was deleted; deleting an absent record
    /// succeeds with `false`. Of concurrent deletes of one record, exactly
    /// one sees `true`.
    async fn delete(&self, id: &WorkerId) -> Result<bool>;

    /// Writes `{status}` for a worker.
    async fn set_status(&self, id: &WorkerId, status: WorkerStatus) -> Result<()> {
        self.set(id, &WorkerRecord::new(status)).await
    }
}

/// In-memory status store.
///
/// Values are kept as the same JSON strings a remote store would hold, and
/// every write is appended to a per-worker history.
#[derive(Debug)]
pub struct MemoryStatusStore {
    prefix: String,
    values: RwLock<HashMap<String, String>>,
    history: RwLock<HashMap<WorkerId, Vec<WorkerStatus>>>,
}

impl Default for MemoryStatusStore {
    fn default() -> Self {
        Self {
            prefix: KEY_PREFIX.to_string(),
            values: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
        }
    }
}

impl MemoryStatusStore {
    /// Creates an empty store using [`KEY_PREFIX`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw stored value of a key.
    #[must_use]
    pub fn raw(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }

    /// Returns every status observed for a worker, oldest first.
    ///
    /// Deleting an existing record is recorded as `REMOVED`.
    #[must_use]
    pub fn history(&self, id: &WorkerId) -> Vec<WorkerStatus> {
        self.history
            .read()
            .ok()
            .and_then(|h| h.get(id).cloned())
            .unwrap_or_default()
    }

    /// Returns the number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or_default()
    }

    /// Returns true if no record is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn key(&self, id: &WorkerId) -> String {
        worker_key(&self.prefix, id)
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn set(&self, id: &WorkerId, record: &WorkerRecord) -> Result<()> {
        let value = serde_json::to_string(record)?;
        self.values
            .write()
            .map_err(|_| WorkerError::store("lock poisoned"))?
            .insert(self.key(id), value);
        self.history
            .write()
            .map_err(|_| WorkerError::store("lock poisoned"))?
            .entry(id.clone())
            .or_default()
            .push(record.status);
        Ok(())
    }

    async fn get(&self, id: &WorkerId) -> Result<Option<WorkerRecord>> {
        let value = self
            .values
            .read()
            .map_err(|_| WorkerError::store("lock poisoned"))?
            .get(&self.key(id))
            .cloned();
        Ok(value.map(|v| serde_json::from_str(&v)).transpose()?)
    }

    async fn delete(&self, id: &WorkerId) -> Result<bool> {
        let existed = self
            .values
            .write()
            .map_err(|_| WorkerError::store("lock poisoned"))?
            .remove(&self.key(id))
            .is_some();
        if existed {
            self.history
                .write()
                .map_err(|_| WorkerError::store("lock poisoned"))?
                .entry(id.clone())
                .or_default()
                .push(WorkerStatus::Removed);
        }
        Ok(existed)
    }
}
