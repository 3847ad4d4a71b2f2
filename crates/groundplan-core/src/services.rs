//! External service seams
//!
//! The orchestrator never runs the IaC tool, fetches repository files, or
//! touches raw key material itself. Those concerns live behind the traits
//! here: submissions go out with a correlation id, and exactly one terminal
//! callback per submission comes back through the orchestrator's callback
//! entry point (at-least-once delivery; duplicates are the orchestrator's
//! problem).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::types::{CorrelationId, ProvisionCommand, RunId, SourceReference, Variable};

/// Service error types
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Submission rejected: {0}")]
    Submission(String),

    #[error("Secret service error: {0}")]
    Secret(String),
}

/// A secret variable reduced to its opaque reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRef {
    pub name: String,
    pub reference: String,
}

/// Payload handed to the external executor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorSubmission {
    pub correlation_id: CorrelationId,
    /// Command actually executed (rollback resolves to apply or destroy
    /// before submission)
    pub command: ProvisionCommand,
    pub provisioner_id: String,
    #[serde(default)]
    pub workspace: Option<String>,
    pub source: SourceReference,
    pub source_path: String,
    /// Plain variables, sent in the clear
    #[serde(default)]
    pub plain_variables: Vec<Variable>,
    /// Secret variables as opaque references only
    #[serde(default)]
    pub secret_variables: Vec<SecretRef>,
    #[serde(default)]
    pub backend_configs: Vec<Variable>,
    #[serde(default)]
    pub targets: Vec<String>,
    /// Previously exported plan body, when inheriting
    #[serde(default)]
    pub inherited_plan: Option<Value>,
}

/// Variable-file fetch handed to the source fetch service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSubmission {
    pub correlation_id: CorrelationId,
    pub repo_url: String,
    pub branch: String,
    pub paths: Vec<String>,
}

/// Terminal status delivered by an asynchronous callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackStatus {
    Success,
    Failed,
}

/// Terminal callback for one submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackResult {
    pub status: CallbackStatus,
    /// Executor-provided error message on failure, surfaced verbatim
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

impl CallbackResult {
    /// Successful callback with a result payload
    pub fn success(payload: Value) -> Self {
        Self {
            status: CallbackStatus::Success,
            message: None,
            payload,
        }
    }

    /// Failed callback with the executor's error message
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: CallbackStatus::Failed,
            message: Some(message.into()),
            payload: Value::Null,
        }
    }
}

/// External executor running the IaC tool remotely
///
/// `submit` only hands the task off. Retry policy for transient executor
/// trouble belongs to the executor itself, never to this core.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn submit(&self, submission: ExecutorSubmission) -> Result<(), ServiceError>;
}

/// Asynchronous variable-file retrieval from source control
///
/// The success callback's payload is expected to carry a `variables` array
/// of name/value/secret entries.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn submit(&self, fetch: FetchSubmission) -> Result<(), ServiceError>;
}

/// Encryption boundary: the core only ever holds opaque references in
/// persisted or submitted form
#[async_trait]
pub trait SecretService: Send + Sync {
    async fn encrypt(&self, value: &str) -> Result<String, ServiceError>;
    async fn decrypt(&self, reference: &str) -> Result<String, ServiceError>;
}

/// Fire-and-forget run status update
#[derive(Debug, Clone)]
pub struct ActivityUpdate {
    pub run_id: RunId,
    /// Phase label, e.g. run_submitted/run_completed/run_skipped
    pub phase: String,
    /// Optional human-readable message
    pub message: Option<String>,
    /// Extra structured metadata
    pub metadata: Value,
}

impl ActivityUpdate {
    pub fn new(run_id: impl Into<RunId>, phase: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            phase: phase.into(),
            message: None,
            metadata: Value::Null,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Sink interface for activity/audit updates. Not on the critical path of
/// correctness; failures are logged and dropped.
#[async_trait]
pub trait ActivityLogger: Send + Sync {
    async fn record(&self, update: ActivityUpdate) -> Result<(), String>;
}
