//! RunStore implementations
//!
//! Correlation bindings are never removed when a run advances or terminates.
//! Late callbacks must still resolve to their run so the orchestrator can
//! recognize and drop them.

use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::RwLock;

use groundplan_core::store::{RunStore, StoreError};
use groundplan_core::types::{CorrelationId, ProvisionRun, RunId};

/// In-memory implementation for development and testing
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<RunId, ProvisionRun>>,
    correlations: RwLock<HashMap<CorrelationId, RunId>>,
}

impl InMemoryRunStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            correlations: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, run: &ProvisionRun) -> Result<(), StoreError> {
        self.runs
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .insert(run.id.clone(), run.clone());
        if let Some(correlation_id) = &run.correlation_id {
            self.correlations
                .write()
                .map_err(|e| StoreError::Internal(e.to_string()))?
                .insert(correlation_id.clone(), run.id.clone());
        }
        Ok(())
    }

    async fn load(&self, run_id: &RunId) -> Result<Option<ProvisionRun>, StoreError> {
        let runs = self
            .runs
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(runs.get(run_id).cloned())
    }

    async fn find_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Option<ProvisionRun>, StoreError> {
        let run_id = {
            let correlations = self
                .correlations
                .read()
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            correlations.get(correlation_id).cloned()
        };
        match run_id {
            Some(run_id) => self.load(&run_id).await,
            None => Ok(None),
        }
    }
}

/// Redis implementation for runs that must survive process restarts.
pub struct RedisRunStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisRunStore {
    /// Create a new Redis run store from a connection URL.
    pub fn new(connection_url: &str, key_prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_url)
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
        })
    }

    fn run_key(&self, run_id: &RunId) -> String {
        format!("{}:run:{}", self.key_prefix, run_id)
    }

    fn correlation_key(&self, correlation_id: &CorrelationId) -> String {
        format!("{}:correlation:{}", self.key_prefix, correlation_id)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl RunStore for RedisRunStore {
    async fn save(&self, run: &ProvisionRun) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let payload = serde_json::to_string(run)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        conn.set::<_, _, ()>(self.run_key(&run.id), payload)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        if let Some(correlation_id) = &run.correlation_id {
            conn.set::<_, _, ()>(self.correlation_key(correlation_id), &run.id)
                .await
                .map_err(|e| StoreError::Connection(e.to_string()))?;
        }
        Ok(())
    }

    async fn load(&self, run_id: &RunId) -> Result<Option<ProvisionRun>, StoreError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn
            .get(self.run_key(run_id))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        payload
            .map(|s| serde_json::from_str(&s).map_err(|e| StoreError::Serialization(e.to_string())))
            .transpose()
    }

    async fn find_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Option<ProvisionRun>, StoreError> {
        let mut conn = self.connection().await?;
        let run_id: Option<String> = conn
            .get(self.correlation_key(correlation_id))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        match run_id {
            Some(run_id) => self.load(&run_id).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundplan_core::types::{ProvisionCommand, ProvisionRequest};

    fn run() -> ProvisionRun {
        ProvisionRun::new(ProvisionRequest::new(
            ProvisionCommand::Apply,
            "prov-1",
            "env-1",
            "main",
            "infra",
            "exec-1",
        ))
    }

    #[test]
    fn test_in_memory_run_store_upserts_by_id() {
        tokio_test::block_on(async {
            let store = InMemoryRunStore::new();
            let mut run = run();
            store.save(&run).await.expect("save");

            run.fail("executor reported failure");
            store.save(&run).await.expect("save again");

            let loaded = store.load(&run.id).await.expect("load").expect("present");
            assert!(loaded.state.is_terminal());
        });
    }

    #[test]
    fn test_in_memory_run_store_keeps_superseded_correlation_bindings() {
        tokio_test::block_on(async {
            let store = InMemoryRunStore::new();
            let mut run = run();

            run.suspend_fetching("corr-fetch");
            store.save(&run).await.expect("save fetch");

            run.suspend_submitted("corr-main", ProvisionCommand::Apply);
            store.save(&run).await.expect("save submit");

            // Both bindings resolve to the same run; the orchestrator tells
            // stale from live by comparing against the run's current id.
            let via_old = store
                .find_by_correlation(&"corr-fetch".to_string())
                .await
                .expect("find old")
                .expect("present");
            let via_new = store
                .find_by_correlation(&"corr-main".to_string())
                .await
                .expect("find new")
                .expect("present");
            assert_eq!(via_old.id, run.id);
            assert_eq!(via_new.id, run.id);
            assert_eq!(via_new.correlation_id.as_deref(), Some("corr-main"));
        });
    }

    #[test]
    fn test_in_memory_run_store_misses_return_none() {
        tokio_test::block_on(async {
            let store = InMemoryRunStore::new();
            assert!(store
                .load(&"missing".to_string())
                .await
                .expect("load")
                .is_none());
            assert!(store
                .find_by_correlation(&"missing".to_string())
                .await
                .expect("find")
                .is_none());
        });
    }
}
