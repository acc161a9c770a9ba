//! Checkpoint storage for run state.
//!
//! After every step or router invocation the executor persists the merged
//! state under the run identifier, so a crash mid-run leaves the store
//! holding the output of the last fully-completed node. The store keeps at
//! most one live snapshot per run identifier: `save` is an idempotent
//! overwrite, never an append.
//!
//! [`InMemoryCheckpointStore`] is the only built-in backend; retention is
//! process-lifetime only. A durable backend is a drop-in implementation of
//! the [`CheckpointStore`] trait and is deliberately not part of this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::state::StateSnapshot;
use crate::types::StepKind;

/// A snapshot of one run's state after a completed node invocation.
#[derive(Clone, Debug)]
pub struct Checkpoint {
    pub run_id: String,
    /// 1-based index of the invocation that produced this snapshot.
    pub step_index: u64,
    /// The node that had just completed when the snapshot was taken.
    pub position: StepKind,
    pub state: StateSnapshot,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(
        run_id: impl Into<String>,
        step_index: u64,
        position: StepKind,
        state: StateSnapshot,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            step_index,
            position,
            state,
            created_at: Utc::now(),
        }
    }
}

/// Errors from checkpoint store operations.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    /// Backend storage error (lock, database, filesystem).
    #[error("checkpoint backend error: {message}")]
    #[diagnostic(
        code(draftflow::checkpoint::backend),
        help("Check backend connectivity and permissions.")
    )]
    Backend { message: String },

    /// Other checkpoint store errors.
    #[error("checkpoint store error: {message}")]
    #[diagnostic(code(draftflow::checkpoint::other))]
    Other { message: String },
}

pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Storage and retrieval of per-run state snapshots.
///
/// Implementations must be `Send + Sync`. Saves replace any existing
/// checkpoint for the run; loads of unknown run identifiers return `None`.
/// Distinct run identifiers never share data, so concurrent access by
/// distinct keys needs no cross-key coordination.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist the latest checkpoint for a run, replacing any prior one.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Load the most recent checkpoint for a run, if any.
    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>>;

    /// List all run identifiers with at least one checkpoint stored.
    async fn list_runs(&self) -> Result<Vec<String>>;
}

/// Volatile process-local checkpoint store. Stores only the latest
/// checkpoint per run identifier.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    inner: RwLock<FxHashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut map = self.inner.write().await;
        map.insert(checkpoint.run_id.clone(), checkpoint);
        Ok(())
    }

    async fn load_latest(&self, run_id: &str) -> Result<Option<Checkpoint>> {
        let map = self.inner.read().await;
        Ok(map.get(run_id).cloned())
    }

    async fn list_runs(&self) -> Result<Vec<String>> {
        let map = self.inner.read().await;
        Ok(map.keys().cloned().collect())
    }
}
