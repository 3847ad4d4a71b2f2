//! # Groundplan Core
//!
//! Core abstractions and deterministic logic for the Groundplan
//! provisioning orchestrator.
//!
//! This crate contains:
//! - Request / Snapshot / Run definitions
//! - Entity identity resolution (current and legacy schemes)
//! - Rollback target selection over append-only config history
//! - The provisioning state machine with executor submit/callback protocol
//! - Store and service abstractions
//!
//! This crate does NOT care about:
//! - Which IaC tool the external executor runs
//! - How submissions and callbacks travel over the wire
//! - Where snapshots, artifacts, and runs are physically stored

pub mod identity;
pub mod orchestrator;
pub mod rollback;
pub mod services;
pub mod store;
pub mod types;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::identity::{candidates, resolve, EntityScope, IdentityScheme};
    pub use crate::orchestrator::{
        ExecutionHandle, ExecutionOutcome, Orchestrator, OrchestratorError,
    };
    pub use crate::rollback::{select_rollback, RollbackDecision};
    pub use crate::services::{
        ActivityLogger, ActivityUpdate, CallbackResult, CallbackStatus, ExecutorSubmission,
        FetchSubmission, SecretRef, SecretService, ServiceError, SourceFetcher, TaskExecutor,
    };
    pub use crate::store::{ConfigHistoryStore, PlanArtifactStore, RunStore, StoreError};
    pub use crate::types::{
        plan_artifact_name, ArtifactScope, ConfigSnapshot, CorrelationId, EntityId, ExecutionId,
        PlanArtifact, PlanKind, ProvisionCommand, ProvisionRequest, ProvisionRun, RemoteVarFiles,
        RunId, RunPhase, RunState, SourceReference, Variable,
    };
}

// Re-export key types at crate root
pub use orchestrator::{ExecutionHandle, ExecutionOutcome, Orchestrator, OrchestratorError};
pub use rollback::{select_rollback, RollbackDecision};
pub use services::{CallbackResult, CallbackStatus, ExecutorSubmission, FetchSubmission};
pub use store::{ConfigHistoryStore, PlanArtifactStore, RunStore, StoreError};
pub use types::{
    ConfigSnapshot, PlanArtifact, ProvisionCommand, ProvisionRequest, ProvisionRun, Variable,
};
