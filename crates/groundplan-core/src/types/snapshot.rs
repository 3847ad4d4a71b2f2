//! ConfigSnapshot and PlanArtifact - persisted provisioning state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ArtifactScope, EntityId, ExecutionId, ProvisionCommand, SourceReference, Variable};

/// Persisted record of a successful apply or destroy
///
/// The store is append-only: snapshots accumulate across executions and are
/// distinguished by `execution_id` and `created_at`. The rollback selector
/// reads them newest first, so append order must follow real-world
/// completion order within one entity id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub entity_id: EntityId,
    pub execution_id: ExecutionId,
    /// Absent in records written before commands were recorded; the rollback
    /// selector treats absence as Apply.
    #[serde(default)]
    pub command: Option<ProvisionCommand>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub backend_configs: Vec<Variable>,
    #[serde(default)]
    pub targets: Vec<String>,
    pub source_reference: SourceReference,
    pub created_at: DateTime<Utc>,
}

impl ConfigSnapshot {
    /// Create a snapshot stamped with the current time
    pub fn new(
        entity_id: impl Into<EntityId>,
        execution_id: impl Into<ExecutionId>,
        command: ProvisionCommand,
        source_reference: SourceReference,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            execution_id: execution_id.into(),
            command: Some(command),
            variables: Vec::new(),
            backend_configs: Vec::new(),
            targets: Vec::new(),
            source_reference,
            created_at: Utc::now(),
        }
    }

    /// Set input variables
    pub fn with_variables(mut self, variables: Vec<Variable>) -> Self {
        self.variables = variables;
        self
    }

    /// Set backend configuration values
    pub fn with_backend_configs(mut self, backend_configs: Vec<Variable>) -> Self {
        self.backend_configs = backend_configs;
        self
    }

    /// Set resource targets
    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = targets;
        self
    }
}

/// Which kind of plan an exported artifact holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    /// Plan toward applying the configuration
    Provision,
    /// Plan toward tearing the configuration down
    Teardown,
}

impl PlanKind {
    fn label(&self) -> &'static str {
        match self {
            Self::Provision => "plan",
            Self::Teardown => "destroy_plan",
        }
    }
}

/// Deterministic artifact name for a plan exported within one execution
///
/// Derived purely from the plan kind and execution id so a later phase in
/// the same execution can reconstruct the name without extra lookups.
pub fn plan_artifact_name(kind: PlanKind, execution_id: &str) -> String {
    format!("{}_{}", kind.label(), execution_id)
}

/// Ephemeral, scope-bound exported plan
///
/// At most one live artifact per name within its scope; saving a new one
/// replaces any existing entry. The payload may be an encrypted opaque
/// reference rather than the raw plan body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanArtifact {
    pub name: String,
    pub scope: ArtifactScope,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl PlanArtifact {
    /// Create an artifact stamped with the current time
    pub fn new(name: impl Into<String>, scope: ArtifactScope, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            scope,
            payload,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plan_artifact_name_is_deterministic_per_kind() {
        assert_eq!(
            plan_artifact_name(PlanKind::Provision, "exec-1"),
            "plan_exec-1"
        );
        assert_eq!(
            plan_artifact_name(PlanKind::Teardown, "exec-1"),
            "destroy_plan_exec-1"
        );
        assert_ne!(
            plan_artifact_name(PlanKind::Provision, "exec-1"),
            plan_artifact_name(PlanKind::Teardown, "exec-1"),
        );
    }

    #[test]
    fn test_snapshot_deserializes_without_command() {
        let json = r#"{
            "entity_id": "e1",
            "execution_id": "x1",
            "source_reference": { "branch": "main" },
            "created_at": "2024-03-01T00:00:00Z"
        }"#;
        let snapshot: ConfigSnapshot = serde_json::from_str(json).expect("parse");
        assert!(snapshot.command.is_none());
        assert!(snapshot.variables.is_empty());
    }

    #[test]
    fn test_artifact_round_trips_through_json() {
        let artifact = PlanArtifact::new(
            "plan_exec-1",
            ArtifactScope::Pipeline,
            json!({"ref": "opaque"}),
        );
        let encoded = serde_json::to_string(&artifact).expect("encode");
        let decoded: PlanArtifact = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, artifact);
    }
}
