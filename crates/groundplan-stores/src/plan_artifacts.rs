//! PlanArtifactStore implementations

use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::RwLock;

use groundplan_core::store::{PlanArtifactStore, StoreError};
use groundplan_core::types::{ArtifactScope, PlanArtifact};

/// In-memory implementation for development and testing
pub struct InMemoryPlanArtifactStore {
    artifacts: RwLock<HashMap<(String, ArtifactScope), PlanArtifact>>,
}

impl InMemoryPlanArtifactStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self {
            artifacts: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryPlanArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PlanArtifactStore for InMemoryPlanArtifactStore {
    async fn save(&self, artifact: PlanArtifact) -> Result<(), StoreError> {
        let mut artifacts = self
            .artifacts
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        artifacts.insert((artifact.name.clone(), artifact.scope), artifact);
        Ok(())
    }

    async fn get(
        &self,
        name: &str,
        scope: ArtifactScope,
    ) -> Result<Option<PlanArtifact>, StoreError> {
        let artifacts = self
            .artifacts
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(artifacts.get(&(name.to_string(), scope)).cloned())
    }

    async fn delete(&self, name: &str, scope: ArtifactScope) -> Result<(), StoreError> {
        let mut artifacts = self
            .artifacts
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        artifacts.remove(&(name.to_string(), scope));
        Ok(())
    }
}

/// Redis implementation for plan artifacts shared across processes.
pub struct RedisPlanArtifactStore {
    client: redis::Client,
    key_prefix: String,
}

impl RedisPlanArtifactStore {
    /// Create a new Redis artifact store from a connection URL.
    pub fn new(connection_url: &str, key_prefix: impl Into<String>) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_url)
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
        })
    }

    fn artifact_key(&self, name: &str, scope: ArtifactScope) -> String {
        format!("{}:artifact:{}:{}", self.key_prefix, scope_label(scope), name)
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, StoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl PlanArtifactStore for RedisPlanArtifactStore {
    async fn save(&self, artifact: PlanArtifact) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let key = self.artifact_key(&artifact.name, artifact.scope);
        let payload = serde_json::to_string(&artifact)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        conn.set::<_, _, ()>(key, payload)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }

    async fn get(
        &self,
        name: &str,
        scope: ArtifactScope,
    ) -> Result<Option<PlanArtifact>, StoreError> {
        let mut conn = self.connection().await?;
        let payload: Option<String> = conn
            .get(self.artifact_key(name, scope))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        payload
            .map(|s| serde_json::from_str(&s).map_err(|e| StoreError::Serialization(e.to_string())))
            .transpose()
    }

    async fn delete(&self, name: &str, scope: ArtifactScope) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.del::<_, ()>(self.artifact_key(name, scope))
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(())
    }
}

fn scope_label(scope: ArtifactScope) -> &'static str {
    match scope {
        ArtifactScope::Workflow => "workflow",
        ArtifactScope::Pipeline => "pipeline",
    }
}
