//! Orchestrator - the provisioning state machine
//!
//! Sequences lifecycle phases, emits executor submissions, and resumes on
//! asynchronous callbacks. Each run is strictly sequential; many runs
//! proceed concurrently across independent entity ids.
//!
//! Concurrent provisioning of the *same* entity id from two executions is
//! not guarded here. The surrounding workflow engine is assumed to
//! serialize per-entity execution; validate that assumption with the system
//! owner before relying on it.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::identity::{candidates, EntityScope};
use crate::rollback::{select_rollback, RollbackDecision};
use crate::services::{
    ActivityLogger, ActivityUpdate, CallbackResult, CallbackStatus, ExecutorSubmission,
    FetchSubmission, SecretRef, SecretService, ServiceError, SourceFetcher, TaskExecutor,
};
use crate::store::{ConfigHistoryStore, PlanArtifactStore, RunStore, StoreError};
use crate::types::{
    plan_artifact_name, ConfigSnapshot, CorrelationId, EntityId, PlanArtifact, PlanKind,
    ProvisionCommand, ProvisionRequest, ProvisionRun, RunId, RunPhase, SourceReference, Variable,
};

/// Orchestrator errors
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Terminal caller mistake: missing provisioner input, missing inherited
    /// plan, and the like. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("no run bound to correlation id: {0}")]
    UnknownCorrelation(String),

    /// The executor succeeded but the subsequent history write failed.
    /// Surfaced loudly because silently losing the record would corrupt
    /// future rollback decisions.
    #[error("history write failed after executor success: {0}")]
    HistoryWriteFailed(StoreError),
}

/// Result of starting a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionHandle {
    /// The run suspended on an external submission
    Pending {
        run_id: RunId,
        correlation_id: CorrelationId,
    },
    /// The run finished synchronously as a success no-op
    Skipped { run_id: RunId, message: String },
}

/// Result of handling one inbound callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The run advanced to its next asynchronous phase
    Pending { correlation_id: CorrelationId },
    Completed,
    Failed { message: String },
    Skipped { message: String },
    /// Duplicate or stale delivery for an already-resolved correlation id;
    /// detected and dropped without side effects
    Ignored,
}

/// Orchestrator - wires stores and external services into the state machine
pub struct Orchestrator {
    pub executor: Arc<dyn TaskExecutor>,
    pub source_fetcher: Arc<dyn SourceFetcher>,
    pub secrets: Arc<dyn SecretService>,
    pub history: Arc<dyn ConfigHistoryStore>,
    pub artifacts: Arc<dyn PlanArtifactStore>,
    pub runs: Arc<dyn RunStore>,
    pub activity_logger: Option<Arc<dyn ActivityLogger>>,
}

impl Orchestrator {
    /// Create a new orchestrator
    pub fn new(
        executor: Arc<dyn TaskExecutor>,
        source_fetcher: Arc<dyn SourceFetcher>,
        secrets: Arc<dyn SecretService>,
        history: Arc<dyn ConfigHistoryStore>,
        artifacts: Arc<dyn PlanArtifactStore>,
        runs: Arc<dyn RunStore>,
    ) -> Self {
        Self {
            executor,
            source_fetcher,
            secrets,
            history,
            artifacts,
            runs,
            activity_logger: None,
        }
    }

    /// Attach an activity/audit sink (optional)
    pub fn with_activity_logger(mut self, logger: Arc<dyn ActivityLogger>) -> Self {
        self.activity_logger = Some(logger);
        self
    }

    /// Start a provisioning run. Returns a pending handle when the run
    /// suspended on an external submission, or a synchronous skip.
    pub async fn execute(
        &self,
        request: ProvisionRequest,
    ) -> Result<ExecutionHandle, OrchestratorError> {
        validate_request(&request)?;

        let mut run = ProvisionRun::new(request);
        run.entity_candidates = entity_candidates_for(&run.request);
        tracing::info!(
            run_id = %run.id,
            command = %run.request.command.label(),
            entity_id = %primary_entity(&run),
            execution_id = %run.request.execution_id,
            "provisioning run started"
        );

        match run.request.command {
            ProvisionCommand::Rollback => self.start_rollback(run).await,
            _ => self.start_provisioning(run).await,
        }
    }

    /// Resume a suspended run on an inbound callback. At-least-once
    /// delivery is assumed: duplicates for terminal runs and callbacks for
    /// superseded correlation ids are ignored without side effects.
    pub async fn handle_callback(
        &self,
        correlation_id: &CorrelationId,
        result: CallbackResult,
    ) -> Result<ExecutionOutcome, OrchestratorError> {
        let Some(mut run) = self.runs.find_by_correlation(correlation_id).await? else {
            return Err(OrchestratorError::UnknownCorrelation(correlation_id.clone()));
        };

        if run.state.is_terminal() || run.correlation_id.as_deref() != Some(correlation_id.as_str())
        {
            tracing::debug!(
                run_id = %run.id,
                correlation_id = %correlation_id,
                "duplicate or stale callback ignored"
            );
            return Ok(ExecutionOutcome::Ignored);
        }

        match run.phase {
            RunPhase::FetchingFiles => self.resume_after_fetch(&mut run, result).await,
            RunPhase::Submitted => self.resume_after_execution(&mut run, result).await,
            phase => {
                tracing::warn!(
                    run_id = %run.id,
                    phase = ?phase,
                    "callback arrived for a run that is not suspended"
                );
                Ok(ExecutionOutcome::Ignored)
            }
        }
    }

    async fn start_rollback(
        &self,
        mut run: ProvisionRun,
    ) -> Result<ExecutionHandle, OrchestratorError> {
        if !run.request.provisioned_in_execution {
            let message = "provisioning did not run in this execution, nothing to roll back";
            run.skip(message);
            self.runs.save(&run).await?;
            self.report_activity(ActivityUpdate::new(run.id.clone(), "run_skipped").with_message(message))
                .await;
            return Ok(ExecutionHandle::Skipped {
                run_id: run.id,
                message: message.to_string(),
            });
        }

        run.set_phase(RunPhase::SelectingRollbackTarget);
        let history = self.load_history(&run.entity_candidates).await?;

        match select_rollback(&history, &run.request.execution_id) {
            RollbackDecision::NotRequired { message } => {
                tracing::info!(run_id = %run.id, %message, "rollback not required");
                run.skip(message.clone());
                self.runs.save(&run).await?;
                self.report_activity(
                    ActivityUpdate::new(run.id.clone(), "run_skipped").with_message(message.clone()),
                )
                .await;
                Ok(ExecutionHandle::Skipped {
                    run_id: run.id,
                    message,
                })
            }
            RollbackDecision::Destroy => {
                tracing::info!(
                    run_id = %run.id,
                    "no prior execution in history, rolling back via destroy"
                );
                let variables = run.request.variables.clone();
                let backend_configs = run.request.backend_configs.clone();
                let source = SourceReference::branch(run.request.source_branch.clone());
                self.submit_main(
                    &mut run,
                    ProvisionCommand::Destroy,
                    variables,
                    backend_configs,
                    Vec::new(),
                    source,
                    false,
                )
                .await
            }
            RollbackDecision::Reapply { command, snapshot } => {
                tracing::info!(
                    run_id = %run.id,
                    source_execution = %snapshot.execution_id,
                    command = %command.label(),
                    "rolling back to prior execution's configuration"
                );
                let variables = snapshot.variables.clone();
                let backend_configs = snapshot.backend_configs.clone();
                let targets = snapshot.targets.clone();
                let source = snapshot.source_reference.clone();
                run.rollback_source = Some(snapshot);
                // Snapshot secrets are already opaque references.
                self.submit_main(&mut run, command, variables, backend_configs, targets, source, true)
                    .await
            }
        }
    }

    async fn start_provisioning(
        &self,
        mut run: ProvisionRun,
    ) -> Result<ExecutionHandle, OrchestratorError> {
        run.set_phase(RunPhase::ResolvingSource);

        let artifact_name = plan_artifact_name(plan_kind_for(&run.request), &run.request.execution_id);
        if run.request.inherit_plan {
            let Some(artifact) = self
                .artifacts
                .get(&artifact_name, run.request.artifact_scope)
                .await?
            else {
                let message = "no previous plan execution found".to_string();
                run.fail(message.clone());
                self.runs.save(&run).await?;
                return Err(OrchestratorError::Configuration(message));
            };
            run.inherited_plan = Some(self.open_plan_payload(artifact.payload).await?);
            self.artifacts
                .delete(&artifact_name, run.request.artifact_scope)
                .await?;
            tracing::debug!(run_id = %run.id, name = %artifact_name, "inherited plan consumed");
        } else if matches!(
            run.request.command,
            ProvisionCommand::Apply | ProvisionCommand::Destroy
        ) {
            // A regular apply/destroy invalidates any leftover exported plan
            // for this execution before doing anything else.
            self.artifacts
                .delete(&artifact_name, run.request.artifact_scope)
                .await?;
        }

        if let Some(files) = run.request.remote_var_files.clone() {
            let correlation_id = new_correlation_id();
            self.source_fetcher
                .submit(FetchSubmission {
                    correlation_id: correlation_id.clone(),
                    repo_url: files.repo_url,
                    branch: files.branch,
                    paths: files.paths,
                })
                .await?;
            run.suspend_fetching(correlation_id.clone());
            self.runs.save(&run).await?;
            tracing::info!(
                run_id = %run.id,
                correlation_id = %correlation_id,
                "suspended on variable file fetch"
            );
            self.report_activity(ActivityUpdate::new(run.id.clone(), "fetch_submitted"))
                .await;
            return Ok(ExecutionHandle::Pending {
                run_id: run.id,
                correlation_id,
            });
        }

        let command = run.request.command;
        let variables = run.request.variables.clone();
        let backend_configs = run.request.backend_configs.clone();
        let targets = run.request.targets.clone();
        let source = SourceReference::branch(run.request.source_branch.clone());
        self.submit_main(&mut run, command, variables, backend_configs, targets, source, false)
            .await
    }

    async fn resume_after_fetch(
        &self,
        run: &mut ProvisionRun,
        result: CallbackResult,
    ) -> Result<ExecutionOutcome, OrchestratorError> {
        if result.status == CallbackStatus::Failed {
            let message = result
                .message
                .unwrap_or_else(|| "variable file fetch failed".to_string());
            run.fail(message.clone());
            self.runs.save(run).await?;
            self.report_activity(
                ActivityUpdate::new(run.id.clone(), "run_failed").with_message(message.clone()),
            )
            .await;
            return Ok(ExecutionOutcome::Failed { message });
        }

        run.fetched_variables = parse_fetched_variables(&result.payload)?;
        tracing::debug!(
            run_id = %run.id,
            count = run.fetched_variables.len(),
            "variable files fetched"
        );

        let command = run.request.command;
        let mut variables = run.request.variables.clone();
        variables.extend(run.fetched_variables.clone());
        let backend_configs = run.request.backend_configs.clone();
        let targets = run.request.targets.clone();
        let source = SourceReference::branch(run.request.source_branch.clone());
        let handle = self
            .submit_main(run, command, variables, backend_configs, targets, source, false)
            .await?;

        match handle {
            ExecutionHandle::Pending { correlation_id, .. } => {
                Ok(ExecutionOutcome::Pending { correlation_id })
            }
            ExecutionHandle::Skipped { message, .. } => Ok(ExecutionOutcome::Skipped { message }),
        }
    }

    async fn resume_after_execution(
        &self,
        run: &mut ProvisionRun,
        result: CallbackResult,
    ) -> Result<ExecutionOutcome, OrchestratorError> {
        if result.status == CallbackStatus::Failed {
            // Surface the executor message verbatim; history and artifacts
            // stay untouched on failure.
            let message = result
                .message
                .unwrap_or_else(|| "executor reported failure".to_string());
            tracing::warn!(run_id = %run.id, error = %message, "executor reported failure");
            run.fail(message.clone());
            self.runs.save(run).await?;
            self.report_activity(
                ActivityUpdate::new(run.id.clone(), "run_failed").with_message(message.clone()),
            )
            .await;
            return Ok(ExecutionOutcome::Failed { message });
        }

        let effective = run.effective_command.unwrap_or(run.request.command);
        if effective.mutates_history() {
            self.apply_history_effects(run, effective, &result.payload)
                .await?;
        } else if run.request.export_plan {
            self.export_plan_artifact(run, &result.payload).await?;
        }

        run.complete();
        self.runs.save(run).await?;
        tracing::info!(run_id = %run.id, command = %effective.label(), "provisioning run completed");
        self.report_activity(ActivityUpdate::new(run.id.clone(), "run_completed"))
            .await;
        Ok(ExecutionOutcome::Completed)
    }

    /// Persist the exported plan. The plan body is sealed through the
    /// secret service so only an opaque reference lands in the store.
    async fn export_plan_artifact(
        &self,
        run: &ProvisionRun,
        payload: &Value,
    ) -> Result<(), OrchestratorError> {
        let name = plan_artifact_name(plan_kind_for(&run.request), &run.request.execution_id);
        let serialized = payload.to_string();
        let reference = self.secrets.encrypt(&serialized).await?;
        let artifact = PlanArtifact::new(
            name.clone(),
            run.request.artifact_scope,
            json!({ "reference": reference }),
        );
        self.artifacts.save(artifact).await?;
        tracing::debug!(run_id = %run.id, %name, "plan artifact exported");
        Ok(())
    }

    /// Unseal an inherited plan payload back into the executor-facing body.
    async fn open_plan_payload(&self, stored: Value) -> Result<Value, OrchestratorError> {
        let Some(reference) = stored.get("reference").and_then(|v| v.as_str()) else {
            // Artifacts written without sealing are passed through as-is.
            return Ok(stored);
        };
        let serialized = self.secrets.decrypt(reference).await?;
        serde_json::from_str(&serialized)
            .map_err(|e| OrchestratorError::Configuration(format!("inherited plan unreadable: {e}")))
    }

    /// Terminal history mutations after a successful apply/destroy. Store
    /// failures here are loud: the executor already succeeded, and losing
    /// the record corrupts future rollback decisions.
    async fn apply_history_effects(
        &self,
        run: &ProvisionRun,
        effective: ProvisionCommand,
        payload: &Value,
    ) -> Result<(), OrchestratorError> {
        let targets = match &run.rollback_source {
            Some(snapshot) => snapshot.targets.clone(),
            None => run.request.targets.clone(),
        };

        if effective == ProvisionCommand::Destroy && targets.is_empty() {
            // A full destroy tombstones the entity's current snapshot.
            let history = self.load_history(&run.entity_candidates).await?;
            if let Some(newest) = history.first() {
                self.history
                    .delete_by_entity_and_execution(&newest.entity_id, &newest.execution_id)
                    .await
                    .map_err(OrchestratorError::HistoryWriteFailed)?;
                tracing::info!(
                    run_id = %run.id,
                    entity_id = %newest.entity_id,
                    "config snapshot removed after full destroy"
                );
            }
            return Ok(());
        }

        let snapshot = self.build_snapshot(run, effective, payload);
        self.history
            .append(snapshot)
            .await
            .map_err(OrchestratorError::HistoryWriteFailed)?;
        tracing::info!(
            run_id = %run.id,
            entity_id = %primary_entity(run),
            command = %effective.label(),
            "config snapshot appended"
        );
        Ok(())
    }

    fn build_snapshot(
        &self,
        run: &ProvisionRun,
        effective: ProvisionCommand,
        payload: &Value,
    ) -> ConfigSnapshot {
        let commit = payload
            .get("commit")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        match &run.rollback_source {
            // Rolling back re-records the inherited configuration under the
            // current execution id.
            Some(source) => {
                let mut snapshot = ConfigSnapshot::new(
                    primary_entity(run),
                    run.request.execution_id.clone(),
                    effective,
                    source.source_reference.clone(),
                )
                .with_variables(source.variables.clone())
                .with_backend_configs(source.backend_configs.clone())
                .with_targets(source.targets.clone());
                if commit.is_some() {
                    snapshot.source_reference.commit = commit;
                }
                snapshot
            }
            None => {
                let mut source = SourceReference::branch(run.request.source_branch.clone());
                source.commit = commit;
                ConfigSnapshot::new(
                    primary_entity(run),
                    run.request.execution_id.clone(),
                    effective,
                    source,
                )
                .with_variables(run.submitted_variables.clone())
                .with_backend_configs(run.request.backend_configs.clone())
                .with_targets(run.request.targets.clone())
            }
        }
    }

    /// Build and hand off the executor submission, suspending the run.
    #[allow(clippy::too_many_arguments)]
    async fn submit_main(
        &self,
        run: &mut ProvisionRun,
        command: ProvisionCommand,
        variables: Vec<Variable>,
        backend_configs: Vec<Variable>,
        targets: Vec<String>,
        source: SourceReference,
        secrets_already_opaque: bool,
    ) -> Result<ExecutionHandle, OrchestratorError> {
        let correlation_id = new_correlation_id();
        let (plain, secret) = self
            .split_variables(variables, secrets_already_opaque)
            .await?;

        run.submitted_variables = plain.clone();
        run.submitted_variables.extend(secret.iter().map(|s| Variable {
            name: s.name.clone(),
            value: s.reference.clone(),
            secret: true,
        }));

        let submission = ExecutorSubmission {
            correlation_id: correlation_id.clone(),
            command,
            provisioner_id: run.request.provisioner_id.clone(),
            workspace: run.request.workspace.clone(),
            source,
            source_path: run.request.source_path.clone(),
            plain_variables: plain,
            secret_variables: secret,
            backend_configs,
            targets,
            inherited_plan: run.inherited_plan.clone(),
        };

        self.executor.submit(submission).await?;
        run.suspend_submitted(correlation_id.clone(), command);
        self.runs.save(run).await?;
        tracing::info!(
            run_id = %run.id,
            correlation_id = %correlation_id,
            command = %command.label(),
            "submitted to external executor"
        );
        self.report_activity(
            ActivityUpdate::new(run.id.clone(), "run_submitted")
                .with_metadata(json!({ "command": command.label() })),
        )
        .await;

        Ok(ExecutionHandle::Pending {
            run_id: run.id.clone(),
            correlation_id,
        })
    }

    /// Split variables into plain and secret sets. Secret values are
    /// encrypted to opaque references unless they already are references
    /// (snapshot-sourced rollback configuration).
    async fn split_variables(
        &self,
        variables: Vec<Variable>,
        already_opaque: bool,
    ) -> Result<(Vec<Variable>, Vec<SecretRef>), ServiceError> {
        let mut plain = Vec::new();
        let mut secret = Vec::new();
        for variable in variables {
            if !variable.secret {
                plain.push(variable);
                continue;
            }
            let reference = if already_opaque {
                variable.value
            } else {
                self.secrets.encrypt(&variable.value).await?
            };
            secret.push(SecretRef {
                name: variable.name,
                reference,
            });
        }
        Ok((plain, secret))
    }

    /// History for the entity, consulting identity candidates in order
    /// (current scheme first, legacy as fallback).
    async fn load_history(
        &self,
        entity_candidates: &[EntityId],
    ) -> Result<Vec<ConfigSnapshot>, StoreError> {
        for entity_id in entity_candidates {
            let snapshots = self.history.list_by_entity(entity_id).await?;
            if !snapshots.is_empty() {
                return Ok(snapshots);
            }
        }
        Ok(Vec::new())
    }

    async fn report_activity(&self, update: ActivityUpdate) {
        if let Some(logger) = &self.activity_logger {
            if let Err(err) = logger.record(update).await {
                tracing::warn!("failed to record activity update: {}", err);
            }
        }
    }
}

fn validate_request(request: &ProvisionRequest) -> Result<(), OrchestratorError> {
    if request.provisioner_id.trim().is_empty() {
        return Err(OrchestratorError::Configuration(
            "provisioner_id must not be empty".to_string(),
        ));
    }
    if request.execution_id.trim().is_empty() {
        return Err(OrchestratorError::Configuration(
            "execution_id must not be empty".to_string(),
        ));
    }
    if request.inherit_plan && request.command == ProvisionCommand::Plan {
        return Err(OrchestratorError::Configuration(
            "a plan step cannot inherit a plan".to_string(),
        ));
    }
    Ok(())
}

fn entity_candidates_for(request: &ProvisionRequest) -> Vec<EntityId> {
    candidates(&EntityScope {
        provisioner_id: &request.provisioner_id,
        environment_id: &request.environment_id,
        branch: &request.source_branch,
        path: &request.source_path,
        workspace: request.workspace.as_deref(),
    })
}

fn primary_entity(run: &ProvisionRun) -> EntityId {
    run.entity_candidates.first().cloned().unwrap_or_default()
}

/// Which artifact name family a request reads or writes
fn plan_kind_for(request: &ProvisionRequest) -> PlanKind {
    let teardown = match request.command {
        ProvisionCommand::Destroy => true,
        ProvisionCommand::Plan => request.destroy_plan,
        _ => false,
    };
    if teardown {
        PlanKind::Teardown
    } else {
        PlanKind::Provision
    }
}

fn new_correlation_id() -> CorrelationId {
    uuid::Uuid::new_v4().to_string()
}

fn parse_fetched_variables(payload: &Value) -> Result<Vec<Variable>, OrchestratorError> {
    let Some(raw) = payload.get("variables") else {
        return Ok(Vec::new());
    };
    serde_json::from_value(raw.clone())
        .map_err(|e| OrchestratorError::Configuration(format!("fetched variables unreadable: {e}")))
}
