//! Store module
//!
//! Storage abstractions consumed by the orchestrator:
//! - ConfigHistoryStore: append-only provisioning history (async trait)
//! - PlanArtifactStore: scope-bound exported plans (async trait)
//! - RunStore: run persistence for suspension/resumption (async trait)
//!
//! Note: Implementations are in the groundplan-stores crate. All mutations
//! are single-record inserts/deletes; there are no multi-record
//! transactions, and readers must tolerate eventual visibility.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    ArtifactScope, ConfigSnapshot, CorrelationId, EntityId, ExecutionId, PlanArtifact,
    ProvisionRun, RunId,
};

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Item not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Append-only store of per-execution provisioning snapshots
///
/// No business logic lives here; ordering and rollback decisions belong to
/// the callers. Within one entity id, appends must follow real-world
/// completion order because listing is newest first.
#[async_trait]
pub trait ConfigHistoryStore: Send + Sync {
    /// Insert a snapshot. Fails only when the underlying store is
    /// unavailable.
    async fn append(&self, snapshot: ConfigSnapshot) -> Result<(), StoreError>;

    /// All snapshots for an entity, newest first. An empty vec (not an
    /// error) when nothing was recorded.
    async fn list_by_entity(&self, entity_id: &EntityId) -> Result<Vec<ConfigSnapshot>, StoreError>;

    /// Best-effort delete; absence of a match is not an error.
    async fn delete_by_entity_and_execution(
        &self,
        entity_id: &EntityId,
        execution_id: &ExecutionId,
    ) -> Result<(), StoreError>;
}

/// Scope-bound store of exported plan artifacts
#[async_trait]
pub trait PlanArtifactStore: Send + Sync {
    /// Replace semantics: an existing artifact with the same name in the
    /// same scope is deleted first, then the new one inserted.
    async fn save(&self, artifact: PlanArtifact) -> Result<(), StoreError>;

    /// Fetch an artifact by name within a scope.
    async fn get(
        &self,
        name: &str,
        scope: ArtifactScope,
    ) -> Result<Option<PlanArtifact>, StoreError>;

    /// Idempotent delete; a no-op when absent.
    async fn delete(&self, name: &str, scope: ArtifactScope) -> Result<(), StoreError>;
}

/// Run persistence for suspension/resumption across process restarts
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or update a run (upsert by run id).
    async fn save(&self, run: &ProvisionRun) -> Result<(), StoreError>;

    /// Load a run by id.
    async fn load(&self, run_id: &RunId) -> Result<Option<ProvisionRun>, StoreError>;

    /// Resolve the run bound to a correlation id, if any. Bindings persist
    /// after a run moves to a later phase or terminates, so stale and
    /// duplicate callbacks can still be routed to their run (and ignored
    /// there).
    async fn find_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Option<ProvisionRun>, StoreError>;
}
