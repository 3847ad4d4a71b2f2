//! Rollback target selection
//!
//! Given the provisioning history of one entity, decides whether rolling
//! back means re-applying a prior configuration, destroying, or doing
//! nothing at all. The scan rules here are subtle and load-bearing; see
//! `select_rollback` for the exact walk.

use crate::types::{ConfigSnapshot, ExecutionId, ProvisionCommand};

/// Outcome of rollback selection. Not persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum RollbackDecision {
    /// No history at all: rollback is a success no-op, distinct from
    /// destroying. Callers must not submit anything.
    NotRequired { message: String },
    /// Every record found belongs to the current execution: there is no
    /// previous successful run, so the only safe state is absence.
    Destroy,
    /// A prior execution's snapshot exists: re-run its recorded command
    /// (Apply unless the record says otherwise) with its configuration as
    /// the desired end state.
    Reapply {
        command: ProvisionCommand,
        snapshot: ConfigSnapshot,
    },
}

/// Select the rollback target from newest-first history.
///
/// The walk tracks the first record owned by the current execution, then
/// keeps scanning past further own records (one execution can produce
/// several snapshots, e.g. apply-then-destroy-then-apply in a single run).
/// The first record from a *different* execution becomes the candidate.
///
/// When own records interleave with older ones (retried sub-steps), only
/// the newest-first scan order decides which record is "current"; records
/// are never deduplicated by content. Preserved as-is from the source
/// system.
pub fn select_rollback(
    history: &[ConfigSnapshot],
    current_execution_id: &ExecutionId,
) -> RollbackDecision {
    if history.is_empty() {
        return RollbackDecision::NotRequired {
            message: "no provisioning history found, apply never happened".to_string(),
        };
    }

    let mut own_record_seen = false;
    for snapshot in history {
        if &snapshot.execution_id == current_execution_id {
            if !own_record_seen {
                own_record_seen = true;
                tracing::debug!(
                    entity_id = %snapshot.entity_id,
                    execution_id = %snapshot.execution_id,
                    "tracked current execution's own record"
                );
            }
            continue;
        }

        let command = snapshot.command.unwrap_or(ProvisionCommand::Apply);
        return RollbackDecision::Reapply {
            command,
            snapshot: snapshot.clone(),
        };
    }

    RollbackDecision::Destroy
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceReference;

    fn snapshot(entity: &str, execution: &str, command: Option<ProvisionCommand>) -> ConfigSnapshot {
        let mut snap = ConfigSnapshot::new(
            entity,
            execution,
            ProvisionCommand::Apply,
            SourceReference::branch("main"),
        );
        snap.command = command;
        snap
    }

    #[test]
    fn test_empty_history_is_a_noop_not_a_destroy() {
        let decision = select_rollback(&[], &"x1".to_string());
        match decision {
            RollbackDecision::NotRequired { message } => {
                assert!(message.contains("apply never happened"));
            }
            other => panic!("expected NotRequired, got {:?}", other),
        }
    }

    #[test]
    fn test_only_own_records_means_destroy() {
        let history = vec![
            snapshot("e1", "x1", Some(ProvisionCommand::Apply)),
            snapshot("e1", "x1", Some(ProvisionCommand::Destroy)),
        ];
        let decision = select_rollback(&history, &"x1".to_string());
        assert_eq!(decision, RollbackDecision::Destroy);
    }

    #[test]
    fn test_prior_execution_record_is_reapplied() {
        // Newest first: x2's own snapshot, then x1's apply.
        let older = snapshot("e1", "x1", Some(ProvisionCommand::Apply));
        let history = vec![
            snapshot("e1", "x2", Some(ProvisionCommand::Apply)),
            older.clone(),
        ];

        let decision = select_rollback(&history, &"x2".to_string());
        match decision {
            RollbackDecision::Reapply { command, snapshot } => {
                assert_eq!(command, ProvisionCommand::Apply);
                assert_eq!(snapshot.execution_id, older.execution_id);
            }
            other => panic!("expected Reapply, got {:?}", other),
        }
    }

    #[test]
    fn test_candidate_command_defaults_to_apply_when_absent() {
        let history = vec![snapshot("e1", "x0", None)];
        let decision = select_rollback(&history, &"x1".to_string());
        match decision {
            RollbackDecision::Reapply { command, .. } => {
                assert_eq!(command, ProvisionCommand::Apply);
            }
            other => panic!("expected Reapply, got {:?}", other),
        }
    }

    #[test]
    fn test_candidate_keeps_recorded_destroy_command() {
        let history = vec![snapshot("e1", "x0", Some(ProvisionCommand::Destroy))];
        let decision = select_rollback(&history, &"x1".to_string());
        match decision {
            RollbackDecision::Reapply { command, .. } => {
                assert_eq!(command, ProvisionCommand::Destroy);
            }
            other => panic!("expected Reapply, got {:?}", other),
        }
    }

    #[test]
    fn test_scan_skips_multiple_own_records_before_candidate() {
        // One execution produced several snapshots; the first differing
        // record after them is the candidate.
        let candidate = snapshot("e1", "x1", Some(ProvisionCommand::Apply));
        let history = vec![
            snapshot("e1", "x2", Some(ProvisionCommand::Apply)),
            snapshot("e1", "x2", Some(ProvisionCommand::Destroy)),
            candidate.clone(),
            snapshot("e1", "x0", Some(ProvisionCommand::Apply)),
        ];

        let decision = select_rollback(&history, &"x2".to_string());
        match decision {
            RollbackDecision::Reapply { snapshot, .. } => {
                assert_eq!(snapshot.execution_id, "x1");
            }
            other => panic!("expected Reapply, got {:?}", other),
        }
    }

    #[test]
    fn test_interleaved_own_records_follow_scan_order_only() {
        // Own records interleaved with older ones: the first differing
        // record in newest-first order wins, even though more own records
        // appear later.
        let history = vec![
            snapshot("e1", "x2", Some(ProvisionCommand::Apply)),
            snapshot("e1", "x1", Some(ProvisionCommand::Apply)),
            snapshot("e1", "x2", Some(ProvisionCommand::Apply)),
            snapshot("e1", "x0", Some(ProvisionCommand::Apply)),
        ];

        let decision = select_rollback(&history, &"x2".to_string());
        match decision {
            RollbackDecision::Reapply { snapshot, .. } => {
                assert_eq!(snapshot.execution_id, "x1");
            }
            other => panic!("expected Reapply, got {:?}", other),
        }
    }
}
