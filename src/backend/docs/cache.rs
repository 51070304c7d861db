/**
 * Document Cache (hot tier)
 *
 * Per-document records held in a shared key-value layer while documents
 * have viewers. Live edits mutate only this tier; the durable store sees
 * the result at snapshot, sync, or last-viewer departure.
 *
 * The backend is pluggable: Redis through a reconnecting connection
 * manager in production, a process-local map in tests. When the backend
 * does not answer, reads return absent and writes return false; the
 * caller degrades instead of failing the connection.
 */
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use uuid::Uuid;

use crate::backend::docs::record::DocRecord;

/// Bounded reconnect attempts before an operation reports unavailable.
const RECONNECT_RETRIES: usize = 3;

#[derive(Clone)]
enum Backend {
    Redis(ConnectionManager),
    Memory(Arc<RwLock<HashMap<Uuid, String>>>),
}

/// Handle to the hot tier. Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct DocCache {
    backend: Backend,
}

impl DocCache {
    /// Connect to the shared cache at `url`.
    ///
    /// The connection manager reconnects on its own with bounded retries;
    /// a manager that cannot be built at all is a startup failure the
    /// caller decides about.
    pub async fn connect(url: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(RECONNECT_RETRIES)
            .set_connection_timeout(Duration::from_secs(5))
            .set_response_timeout(Duration::from_secs(5));
        let manager = ConnectionManager::new_with_config(client, config).await?;
        Ok(Self {
            backend: Backend::Redis(manager),
        })
    }

    /// Process-local backend for tests and single-node development.
    pub fn in_memory() -> Self {
        Self {
            backend: Backend::Memory(Arc::new(RwLock::new(HashMap::new()))),
        }
    }

    fn key(id: Uuid) -> String {
        format!("doc:{id}")
    }

    /// Fetch the cached record, or absent on miss or backend failure.
    pub async fn get(&self, id: Uuid) -> Option<DocRecord> {
        let raw = match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                match conn.get::<_, Option<String>>(Self::key(id)).await {
                    Ok(value) => value,
                    Err(e) => {
                        tracing::warn!("[Cache] get {} failed: {}", id, e);
                        return None;
                    }
                }
            }
            Backend::Memory(map) => map.read().ok().and_then(|m| m.get(&id).cloned()),
        }?;

        match serde_json::from_str(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                // A record this process cannot read is as good as absent;
                // rehydration from the durable store replaces it.
                tracing::error!("[Cache] undecodable record for {}: {}", id, e);
                None
            }
        }
    }

    /// Store the record. Returns false when the backend did not accept
    /// the write.
    pub async fn put(&self, record: &DocRecord) -> bool {
        let raw = match serde_json::to_string(record) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!("[Cache] failed to encode record {}: {}", record.id, e);
                return false;
            }
        };
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                match conn.set::<_, _, ()>(Self::key(record.id), raw).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("[Cache] put {} failed: {}", record.id, e);
                        false
                    }
                }
            }
            Backend::Memory(map) => match map.write() {
                Ok(mut m) => {
                    m.insert(record.id, raw);
                    true
                }
                Err(_) => false,
            },
        }
    }

    /// Read-modify-write one record. The round trip is not atomic
    /// across the network; callers serialize per document through the
    /// write lane. Returns false on miss or a refused write.
    pub async fn update<F>(&self, id: Uuid, mutator: F) -> bool
    where
        F: FnOnce(&mut DocRecord),
    {
        let Some(mut record) = self.get(id).await else {
            return false;
        };
        mutator(&mut record);
        self.put(&record).await
    }

    /// Remove the record (document deleted or evicted).
    pub async fn delete(&self, id: Uuid) -> bool {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                match conn.del::<_, ()>(Self::key(id)).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("[Cache] delete {} failed: {}", id, e);
                        false
                    }
                }
            }
            Backend::Memory(map) => map.write().map(|mut m| m.remove(&id).is_some()).unwrap_or(false),
        }
    }

    /// Drop every cached record. Called once at process startup: a cache
    /// left over from a previous run cannot be trusted after a crash.
    pub async fn flush_all(&self) -> bool {
        match &self.backend {
            Backend::Redis(manager) => {
                let mut conn = manager.clone();
                let flushed: redis::RedisResult<()> =
                    redis::cmd("FLUSHDB").query_async(&mut conn).await;
                match flushed {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("[Cache] flush failed: {}", e);
                        false
                    }
                }
            }
            Backend::Memory(map) => {
                if let Ok(mut m) = map.write() {
                    m.clear();
                    true
                } else {
                    false
                }
            }
        }
    }
}
