//! Shared directory of registered game servers.
//!
//! The registry is written by the heartbeat/reporting side and read by
//! browse sessions. Sessions only ever take snapshots; a snapshot reflects
//! a recent, internally consistent view and concurrent updates landing
//! mid-request are acceptable.

use shared::GameServerRecord;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Registered servers keyed by an opaque server id.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    servers: RwLock<HashMap<String, GameServerRecord>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a server record under `id`.
    pub async fn register(&self, id: impl Into<String>, record: GameServerRecord) {
        self.servers.write().await.insert(id.into(), record);
    }

    /// Removes a server, returning its last record if it was known.
    pub async fn remove(&self, id: &str) -> Option<GameServerRecord> {
        self.servers.write().await.remove(id)
    }

    /// Clones the current record set for one query's lifetime.
    pub async fn snapshot(&self) -> Vec<GameServerRecord> {
        self.servers.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.servers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.servers.read().await.is_empty()
    }
}
