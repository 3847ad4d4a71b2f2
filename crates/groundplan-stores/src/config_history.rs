//! ConfigHistoryStore implementations

use async_trait::async_trait;
use redis::AsyncCommands;
use std::sync::RwLock;

use groundplan_core::store::{ConfigHistoryStore, StoreError};
use groundplan_core::types::{ConfigSnapshot, EntityId, ExecutionId};

const DEFAULT_IN_MEMORY_SNAPSHOT_LIMIT: usize = 10_000;

/// In-memory implementation for development and testing
///
/// Insertion order stands in for completion order, so listing reverses it.
pub struct InMemoryConfigHistoryStore {
    snapshots: RwLock<Vec<ConfigSnapshot>>,
    max_snapshots: usize,
}

impl InMemoryConfigHistoryStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::with_max_snapshots(DEFAULT_IN_MEMORY_SNAPSHOT_LIMIT)
    }

    /// Create a new in-memory store with a hard capacity limit.
    pub fn with_max_snapshots(max_snapshots: usize) -> Self {
        Self {
            snapshots: RwLock::new(Vec::new()),
            max_snapshots: max_snapshots.max(1),
        }
    }
}

impl Default for InMemoryConfigHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigHistoryStore for InMemoryConfigHistoryStore {
    async fn append(&self, snapshot: ConfigSnapshot) -> Result<(), StoreError> {
        let mut snaps = self
            .snapshots
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        if snaps.len() >= self.max_snapshots {
            let overflow = snaps
                .len()
                .saturating_add(1)
                .saturating_sub(self.max_snapshots);
            if overflow > 0 {
                snaps.drain(0..overflow);
            }
        }
        snaps.push(snapshot);
        Ok(())
    }

    async fn list_by_entity(&self, entity_id: &EntityId) -> Result<Vec<ConfigSnapshot>, StoreError> {
        let snaps = self
            .snapshots
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(snaps
            .iter()
            .rev()
            .filter(|s| &s.entity_id == entity_id)
            .cloned()
            .collect())
    }

    async fn delete_by_entity_and_execution(
        &self,
        entity_id: &EntityId,
        execution_id: &ExecutionId,
    ) -> Result<(), StoreError> {
        let mut snaps = self
            .snapshots
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        snaps.retain(|s| !(&s.entity_id == entity_id && &s.execution_id == execution_id));
        Ok(())
    }
}

/// Redis implementation for durable provisioning history.
///
/// Each entity's history is a sorted set scored by creation time, with the
/// serialized snapshot as the member. Listing walks the set newest first.
pub struct RedisConfigHistoryStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisConfigHistoryStore {
    /// Create a new Redis history store from a connection URL.
    pub fn new(connection_url: &str, key_prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_url)
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
        })
    }

    fn history_key(&self, entity_id: &EntityId) -> String {
        format!("{}:history:{}", self.key_prefix, entity_id)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl ConfigHistoryStore for RedisConfigHistoryStore {
    async fn append(&self, snapshot: ConfigSnapshot) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let key = self.history_key(&snapshot.entity_id);
        let payload = serde_json::to_string(&snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let score = snapshot.created_at.timestamp_millis();

        conn.zadd::<_, _, _, ()>(key, payload, score)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn list_by_entity(&self, entity_id: &EntityId) -> Result<Vec<ConfigSnapshot>, StoreError> {
        let mut conn = self.connection().await?;
        let payloads: Vec<String> = conn
            .zrevrange(self.history_key(entity_id), 0, -1)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let mut snapshots = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let snapshot: ConfigSnapshot = serde_json::from_str(&payload)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    async fn delete_by_entity_and_execution(
        &self,
        entity_id: &EntityId,
        execution_id: &ExecutionId,
    ) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let key = self.history_key(entity_id);
        let payloads: Vec<String> = conn
            .zrange(&key, 0, -1)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        for payload in payloads {
            let snapshot: ConfigSnapshot = serde_json::from_str(&payload)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            if &snapshot.execution_id == execution_id {
                conn.zrem::<_, _, ()>(&key, payload)
                    .await
                    .map_err(|e| StoreError::Connection(e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundplan_core::types::{ProvisionCommand, SourceReference};

    fn snapshot(entity: &str, execution: &str) -> ConfigSnapshot {
        ConfigSnapshot::new(
            entity,
            execution,
            ProvisionCommand::Apply,
            SourceReference::branch("main"),
        )
    }

    #[test]
    fn test_in_memory_history_lists_newest_first_per_entity() {
        tokio_test::block_on(async {
            let store = InMemoryConfigHistoryStore::new();
            store.append(snapshot("e1", "x1")).await.expect("append x1");
            store.append(snapshot("e2", "y1")).await.expect("append y1");
            store.append(snapshot("e1", "x2")).await.expect("append x2");

            let history = store.list_by_entity(&"e1".to_string()).await.expect("list");
            assert_eq!(history.len(), 2);
            assert_eq!(history[0].execution_id, "x2");
            assert_eq!(history[1].execution_id, "x1");

            let empty = store.list_by_entity(&"e3".to_string()).await.expect("list");
            assert!(empty.is_empty());
        });
    }

    #[test]
    fn test_in_memory_history_delete_is_scoped_and_idempotent() {
        tokio_test::block_on(async {
            let store = InMemoryConfigHistoryStore::new();
            store.append(snapshot("e1", "x1")).await.expect("append");
            store.append(snapshot("e1", "x2")).await.expect("append");

            store
                .delete_by_entity_and_execution(&"e1".to_string(), &"x1".to_string())
                .await
                .expect("delete");
            // Deleting again is a no-op, not an error.
            store
                .delete_by_entity_and_execution(&"e1".to_string(), &"x1".to_string())
                .await
                .expect("delete again");

            let history = store.list_by_entity(&"e1".to_string()).await.expect("list");
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].execution_id, "x2");
        });
    }

    #[test]
    fn test_in_memory_history_evicts_oldest_when_limit_exceeded() {
        tokio_test::block_on(async {
            let store = InMemoryConfigHistoryStore::with_max_snapshots(2);
            store.append(snapshot("e1", "x1")).await.expect("append");
            store.append(snapshot("e1", "x2")).await.expect("append");
            store.append(snapshot("e1", "x3")).await.expect("append");

            let history = store.list_by_entity(&"e1".to_string()).await.expect("list");
            assert_eq!(history.len(), 2);
            assert_eq!(history[0].execution_id, "x3");
            assert_eq!(history[1].execution_id, "x2");
        });
    }
}
