//! Redis-backed status store.

use crate::error::{Result, WorkerError};
use crate::status::{KEY_PREFIX, StatusStore, worker_key};
use async_trait::async_trait;
use jagereye_protocol::{WorkerId, WorkerRecord};
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;

/// Status store on a Redis server.
#[derive(Clone)]
pub struct RedisStatusStore {
    conn: MultiplexedConnection,
    prefix: String,
}

impl RedisStatusStore {
    /// Connects to Redis, e.g. `redis://localhost:6379`.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Store`] if the URL is invalid or the server
    /// cannot be reached.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).map_err(WorkerError::store)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(WorkerError::store)?;

        tracing::info!(url, "connected to status store");
        Ok(Self {
            conn,
            prefix: KEY_PREFIX.to_string(),
        })
    }

    /// Overrides the key prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }
}

#[async_trait]
impl StatusStore for RedisStatusStore {
    async fn set(&self, id: &WorkerId, record: &WorkerRecord) -> Result<()> {
        let value = serde_json::to_string(record)?;
        self.conn
            .clone()
            .set::<_, _, ()>(worker_key(&self.prefix, id), value)
            .await
            .map_err(WorkerError::store)
    }

    async fn get(&self, id: &WorkerId) -> Result<Option<WorkerRecord>> {
        let value: Option<String> = self
            .conn
            .clone()
            .get(worker_key(&self.prefix, id))
            .await
            .map_err(WorkerError::store)?;
        Ok(value.map(|v| serde_json::from_str(&v)).transpose()?)
    }

    async fn delete(&self, id: &WorkerId) -> Result<bool> {
        let deleted: usize = self
            .conn
            .clone()
            .del(worker_key(&self.prefix, id))
            .await
            .map_err(WorkerError::store)?;
        Ok(deleted > 0)
    }
}

impl std::fmt::Debug for RedisStatusStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStatusStore")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}
