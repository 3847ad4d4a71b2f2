//! # Groundplan Stores
//!
//! Store implementations for the Groundplan provisioning orchestrator.
//!
//! This crate provides:
//! - InMemory and Redis ConfigHistoryStore
//! - InMemory and Redis PlanArtifactStore
//! - InMemory and Redis RunStore

mod config_history;
mod plan_artifacts;
mod run_store;

pub use config_history::{InMemoryConfigHistoryStore, RedisConfigHistoryStore};
pub use plan_artifacts::{InMemoryPlanArtifactStore, RedisPlanArtifactStore};
pub use run_store::{InMemoryRunStore, RedisRunStore};

// Re-export core traits for convenience
pub use groundplan_core::store::{ConfigHistoryStore, PlanArtifactStore, RunStore, StoreError};
