//! ProvisionRequest - the immutable per-invocation intent

use serde::{Deserialize, Serialize};

use super::ExecutionId;

/// Lifecycle command driving a provisioning run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisionCommand {
    /// Compute a plan without mutating infrastructure
    Plan,
    /// Apply the configuration
    Apply,
    /// Tear down provisioned resources
    Destroy,
    /// Roll back to the last known-good configuration
    Rollback,
}

impl ProvisionCommand {
    /// Stable label used in logs and executor payloads
    pub fn label(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Apply => "apply",
            Self::Destroy => "destroy",
            Self::Rollback => "rollback",
        }
    }

    /// Whether a successful run of this command mutates config history
    pub fn mutates_history(&self) -> bool {
        matches!(self, Self::Apply | Self::Destroy)
    }
}

/// A named input value, flagged plain or secret
///
/// Secret values are split out at submission time and replaced by opaque
/// references from the secret service; raw secret bytes never appear in
/// persisted snapshots or submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub secret: bool,
}

impl Variable {
    /// Create a plain variable
    pub fn plain(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            secret: false,
        }
    }

    /// Create a secret variable
    pub fn secret(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            secret: true,
        }
    }
}

/// Scope binding for exported plan artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactScope {
    #[default]
    Workflow,
    Pipeline,
}

/// Reference to the source-control revision a run was provisioned from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceReference {
    pub branch: String,
    /// Resolved commit, when the executor reported one
    #[serde(default)]
    pub commit: Option<String>,
}

impl SourceReference {
    pub fn branch(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            commit: None,
        }
    }
}

/// Variable files that must be fetched from a repository before submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVarFiles {
    pub repo_url: String,
    pub branch: String,
    pub paths: Vec<String>,
}

/// ProvisionRequest - immutable description of one provisioning invocation
///
/// Carries everything the orchestrator needs to derive the entity identity,
/// locate prior state, and build the executor submission. Threaded through
/// the state machine by value; phases never mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub command: ProvisionCommand,
    pub provisioner_id: String,
    pub environment_id: String,
    #[serde(default)]
    pub workspace: Option<String>,
    pub source_branch: String,
    pub source_path: String,
    /// Identifies the enclosing workflow run
    pub execution_id: ExecutionId,
    /// Optional resource filter; empty means the whole configuration
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub variables: Vec<Variable>,
    #[serde(default)]
    pub backend_configs: Vec<Variable>,
    /// Plan-only: export the computed plan as an artifact for a later apply
    #[serde(default)]
    pub export_plan: bool,
    /// Apply/Destroy: reuse the plan exported earlier in this execution
    #[serde(default)]
    pub inherit_plan: bool,
    /// Plan-only: the plan describes a teardown rather than a provision
    #[serde(default)]
    pub destroy_plan: bool,
    #[serde(default)]
    pub artifact_scope: ArtifactScope,
    /// When set, variable files are fetched asynchronously before submission
    #[serde(default)]
    pub remote_var_files: Option<RemoteVarFiles>,
    /// Rollback guard: whether provisioning actually ran in this execution.
    /// Owned by the calling workflow engine, not derivable here.
    #[serde(default = "default_true")]
    pub provisioned_in_execution: bool,
}

fn default_true() -> bool {
    true
}

impl ProvisionRequest {
    /// Minimal request with required fields; optional fields take defaults
    pub fn new(
        command: ProvisionCommand,
        provisioner_id: impl Into<String>,
        environment_id: impl Into<String>,
        source_branch: impl Into<String>,
        source_path: impl Into<String>,
        execution_id: impl Into<String>,
    ) -> Self {
        Self {
            command,
            provisioner_id: provisioner_id.into(),
            environment_id: environment_id.into(),
            workspace: None,
            source_branch: source_branch.into(),
            source_path: source_path.into(),
            execution_id: execution_id.into(),
            targets: Vec::new(),
            variables: Vec::new(),
            backend_configs: Vec::new(),
            export_plan: false,
            inherit_plan: false,
            destroy_plan: false,
            artifact_scope: ArtifactScope::default(),
            remote_var_files: None,
            provisioned_in_execution: true,
        }
    }

    /// Set the workspace
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    /// Set the resource targets
    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = targets;
        self
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

    /// Export the computed plan for a later inheriting step
    pub fn with_export_plan(mut self) -> Self {
        self.export_plan = true;
        self
    }

    /// Inherit the plan exported earlier in this execution
    pub fn with_inherit_plan(mut self) -> Self {
        self.inherit_plan = true;
        self
    }

    /// Fetch variable files from a repository before submission
    pub fn with_remote_var_files(mut self, files: RemoteVarFiles) -> Self {
        self.remote_var_files = Some(files);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_labels_and_history_mutation() {
        assert_eq!(ProvisionCommand::Plan.label(), "plan");
        assert_eq!(ProvisionCommand::Rollback.label(), "rollback");

        assert!(ProvisionCommand::Apply.mutates_history());
        assert!(ProvisionCommand::Destroy.mutates_history());
        assert!(!ProvisionCommand::Plan.mutates_history());
        assert!(!ProvisionCommand::Rollback.mutates_history());
    }

    #[test]
    fn test_request_defaults() {
        let request = ProvisionRequest::new(
            ProvisionCommand::Apply,
            "prov-1",
            "env-1",
            "main",
            "infra/network",
            "exec-1",
        );

        assert!(request.workspace.is_none());
        assert!(request.targets.is_empty());
        assert!(!request.export_plan);
        assert!(!request.inherit_plan);
        assert!(request.provisioned_in_execution);
        assert_eq!(request.artifact_scope, ArtifactScope::Workflow);
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = r#"{
            "command": "plan",
            "provisioner_id": "prov-1",
            "environment_id": "env-1",
            "source_branch": "main",
            "source_path": "infra",
            "execution_id": "exec-1"
        }"#;
        let request: ProvisionRequest = serde_json::from_str(json).expect("parse");
        assert_eq!(request.command, ProvisionCommand::Plan);
        assert!(request.provisioned_in_execution);
    }
}
