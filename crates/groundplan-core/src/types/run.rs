//! ProvisionRun - the persisted run context with resumption token
//!
//! A run suspends whenever it hands work to an external service and resumes
//! on the matching callback. Everything needed to resume without re-deriving
//! inputs lives here, because the process may restart in between.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    ConfigSnapshot, CorrelationId, EntityId, ProvisionCommand, ProvisionRequest, Variable,
};

/// Type alias for run IDs
pub type RunId = String;

/// Phase of the provisioning state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Entity identity not yet resolved
    Init,
    /// Rollback only: consulting history for a rollback target
    SelectingRollbackTarget,
    /// Identity resolved, building the submission
    ResolvingSource,
    /// Suspended on an asynchronous variable-file fetch
    FetchingFiles,
    /// Suspended on the external executor
    Submitted,
}

/// Terminal and non-terminal run states
///
/// Aborting a suspended run performs no cleanup: plan artifacts and
/// in-flight executor tasks are left as-is (inherited behavior).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunState {
    /// In progress, possibly suspended on a callback
    Running,
    /// Terminal success
    Completed,
    /// Terminal failure
    Failed {
        /// Error message, surfaced verbatim from the executor when it failed
        reason: String,
    },
    /// Terminal success without any work performed
    Skipped {
        /// Why the run was a no-op
        reason: String,
    },
}

impl RunState {
    /// Check if the run reached a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

/// ProvisionRun - the stateful run context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionRun {
    /// Unique identifier for this run
    pub id: RunId,
    /// The request that initiated this run
    pub request: ProvisionRequest,
    /// Entity id candidates, current identity scheme first
    pub entity_candidates: Vec<EntityId>,
    /// Current phase
    pub phase: RunPhase,
    /// Current state
    pub state: RunState,
    /// Correlation id of the outstanding submission, if suspended
    #[serde(default)]
    pub correlation_id: Option<CorrelationId>,
    /// Command actually submitted to the executor (rollback resolves to
    /// apply or destroy before submission)
    #[serde(default)]
    pub effective_command: Option<ProvisionCommand>,
    /// Rollback only: the snapshot whose configuration is being re-applied
    #[serde(default)]
    pub rollback_source: Option<ConfigSnapshot>,
    /// Variables obtained from the asynchronous source fetch
    #[serde(default)]
    pub fetched_variables: Vec<Variable>,
    /// Variables as submitted, with secret values already reduced to opaque
    /// references; reused verbatim when recording the config snapshot
    #[serde(default)]
    pub submitted_variables: Vec<Variable>,
    /// Inherited plan payload resolved during Init
    #[serde(default)]
    pub inherited_plan: Option<serde_json::Value>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl ProvisionRun {
    /// Create a new run from a request
    pub fn new(request: ProvisionRequest) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            request,
            entity_candidates: Vec::new(),
            phase: RunPhase::Init,
            state: RunState::Running,
            correlation_id: None,
            effective_command: None,
            rollback_source: None,
            fetched_variables: Vec::new(),
            submitted_variables: Vec::new(),
            inherited_plan: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the phase
    pub fn set_phase(&mut self, phase: RunPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    /// Suspend on an asynchronous variable-file fetch
    pub fn suspend_fetching(&mut self, correlation_id: impl Into<CorrelationId>) {
        self.correlation_id = Some(correlation_id.into());
        self.set_phase(RunPhase::FetchingFiles);
    }

    /// Suspend on the external executor
    pub fn suspend_submitted(
        &mut self,
        correlation_id: impl Into<CorrelationId>,
        effective_command: ProvisionCommand,
    ) {
        self.correlation_id = Some(correlation_id.into());
        self.effective_command = Some(effective_command);
        self.set_phase(RunPhase::Submitted);
    }

    /// Transition to completed
    pub fn complete(&mut self) {
        self.state = RunState::Completed;
        self.updated_at = Utc::now();
    }

    /// Transition to failed
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.state = RunState::Failed {
            reason: reason.into(),
        };
        self.updated_at = Utc::now();
    }

    /// Transition to skipped (success no-op)
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.state = RunState::Skipped {
            reason: reason.into(),
        };
        self.updated_at = Utc::now();
    }
}
