//! Type definitions
//!
//! This module defines the data model shared across the crate:
//! - ProvisionRequest / ProvisionCommand: the per-invocation intent
//! - ConfigSnapshot: persisted record of a successful apply/destroy
//! - PlanArtifact: ephemeral, scope-bound exported plan
//! - ProvisionRun: the stateful run context with resumption token

mod request;
mod run;
mod snapshot;

pub use request::{
    ArtifactScope, ProvisionCommand, ProvisionRequest, RemoteVarFiles, SourceReference, Variable,
};
pub use run::{ProvisionRun, RunId, RunPhase, RunState};
pub use snapshot::{plan_artifact_name, ConfigSnapshot, PlanArtifact, PlanKind};

/// Type alias for the derived stable entity identifier
pub type EntityId = String;

/// Type alias for the enclosing workflow execution identifier
pub type ExecutionId = String;

/// Type alias for async submission correlation identifiers
pub type CorrelationId = String;
