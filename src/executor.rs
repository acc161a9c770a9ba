//! Sequential graph traversal for a single run.
//!
//! The executor drives one run from the entry node to the terminal sentinel:
//! invoke the current node, merge or route, checkpoint, advance. Steps within
//! a run execute strictly in traversal order; there is no parallel fan-out.
//! Independent run identifiers may execute on separate tasks because the
//! checkpoint store is keyed by run identifier.
//!
//! Error taxonomy follows three distinct families so operators can tell them
//! apart: collaborator failures inside a node ([`RunError::Step`] /
//! [`RunError::Router`]), graph-integrity defects that validation should
//! have made unreachable ([`RunError::UnknownOutcome`] and friends), and the
//! defensive did-not-terminate guard ([`RunError::StepLimitExceeded`]).
//! Nothing is retried or swallowed; the last successful checkpoint stays in
//! the store for diagnosis.

use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::checkpoint::{Checkpoint, CheckpointError, CheckpointStore, InMemoryCheckpointStore};
use crate::config::RunConfig;
use crate::graph::Graph;
use crate::state::{RunState, StateError, StateSnapshot, StateUpdate};
use crate::step::{StepContext, StepError};
use crate::types::StepKind;

/// Default ceiling for the defensive non-termination guard. Validation is
/// the real loop-prevention mechanism; this is a belt-and-braces net.
pub const DEFAULT_STEP_LIMIT: u64 = 128;

/// Errors that fail a run.
#[derive(Debug, Error, Diagnostic)]
pub enum RunError {
    /// A step body failed (usually an external collaborator call).
    #[error("step {node} failed")]
    #[diagnostic(code(draftflow::run::step))]
    Step {
        node: String,
        #[source]
        source: StepError,
    },

    /// A router body failed (usually an external collaborator call).
    #[error("router {node} failed")]
    #[diagnostic(code(draftflow::run::router))]
    Router {
        node: String,
        #[source]
        source: StepError,
    },

    /// A router produced an outcome label with no registered successor.
    /// Declared outcomes and registered edges match by construction, so this
    /// signals a graph-integrity defect, not a collaborator failure.
    #[error("router {node} produced unregistered outcome {outcome:?}")]
    #[diagnostic(
        code(draftflow::run::unknown_outcome),
        help("The graph is wired wrong: declared outcomes and registered edges disagree.")
    )]
    UnknownOutcome { node: String, outcome: String },

    /// Traversal reached a step with no static successor. Unreachable for a
    /// compiled graph; kept distinct from collaborator failures.
    #[error("step {node} has no successor")]
    #[diagnostic(code(draftflow::run::missing_successor))]
    MissingSuccessor { node: String },

    /// Traversal reached a node the graph does not contain. Unreachable for
    /// a compiled graph.
    #[error("graph does not contain node {node}")]
    #[diagnostic(code(draftflow::run::unknown_node))]
    UnknownNode { node: String },

    /// A node wrote a field outside the declared schema, or the seed did.
    #[error(transparent)]
    #[diagnostic(code(draftflow::run::state))]
    State(#[from] StateError),

    #[error(transparent)]
    #[diagnostic(code(draftflow::run::checkpoint))]
    Checkpoint(#[from] CheckpointError),

    /// The defensive maximum-step guard fired: graph did not terminate.
    #[error("graph did not terminate within {limit} steps")]
    #[diagnostic(
        code(draftflow::run::step_limit),
        help("A router kept re-entering a loop; check its outcome logic.")
    )]
    StepLimitExceeded { limit: u64 },
}

/// Drives runs of one compiled graph.
pub struct Executor {
    graph: Arc<Graph>,
    store: Arc<dyn CheckpointStore>,
    step_limit: Option<u64>,
}

impl Executor {
    /// Wrap a compiled graph with an in-memory checkpoint store and the
    /// default step limit.
    pub fn new(graph: Graph) -> Self {
        Self::with_store(Arc::new(graph), Arc::new(InMemoryCheckpointStore::new()))
    }

    pub fn with_store(graph: Arc<Graph>, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            graph,
            store,
            step_limit: Some(DEFAULT_STEP_LIMIT),
        }
    }

    /// Override the defensive step guard; `None` disables it.
    pub fn step_limit(mut self, limit: Option<u64>) -> Self {
        self.step_limit = limit;
        self
    }

    pub fn checkpoints(&self) -> Arc<dyn CheckpointStore> {
        self.store.clone()
    }

    /// Run the graph to the terminal sentinel for one run identifier,
    /// starting from the caller-supplied seed fields.
    ///
    /// Returns the final state snapshot. On failure the last successful
    /// checkpoint remains in the store under `run_id`.
    #[instrument(skip(self, seed), err)]
    pub async fn run(&self, run_id: &str, seed: StateUpdate) -> Result<StateSnapshot, RunError> {
        let mut state = RunState::seeded(self.graph.schema(), seed)?;
        let mut current = self.graph.entry().clone();
        let mut step_index: u64 = 0;

        info!(run_id, entry = %current, "run started");

        loop {
            if current.is_end() {
                info!(run_id, steps = step_index, "run reached terminal sentinel");
                return Ok(state.snapshot());
            }
            if let Some(limit) = self.step_limit {
                if step_index >= limit {
                    return Err(RunError::StepLimitExceeded { limit });
                }
            }
            step_index += 1;

            let ctx = StepContext {
                node_id: current.encode(),
                step_index,
            };

            let next = if let Some(step) = self.graph.step(&current) {
                debug!(run_id, node = %current, step_index, "invoking step");
                let update =
                    step.run(state.snapshot(), ctx)
                        .await
                        .map_err(|source| RunError::Step {
                            node: current.encode(),
                            source,
                        })?;
                state.merge(update)?;
                self.save_checkpoint(run_id, step_index, &current, &state)
                    .await?;
                self.graph
                    .successor_of(&current)
                    .cloned()
                    .ok_or_else(|| RunError::MissingSuccessor {
                        node: current.encode(),
                    })?
            } else if let Some(node) = self.graph.router(&current) {
                debug!(run_id, node = %current, step_index, "invoking router");
                let outcome =
                    node.router
                        .route(state.snapshot(), ctx)
                        .await
                        .map_err(|source| RunError::Router {
                            node: current.encode(),
                            source,
                        })?;
                self.save_checkpoint(run_id, step_index, &current, &state)
                    .await?;
                debug!(run_id, node = %current, outcome = %outcome, "router resolved");
                node.outcomes
                    .get(&outcome)
                    .cloned()
                    .ok_or_else(|| RunError::UnknownOutcome {
                        node: current.encode(),
                        outcome,
                    })?
            } else {
                return Err(RunError::UnknownNode {
                    node: current.encode(),
                });
            };

            current = next;
        }
    }

    async fn save_checkpoint(
        &self,
        run_id: &str,
        step_index: u64,
        position: &StepKind,
        state: &RunState,
    ) -> Result<(), CheckpointError> {
        self.store
            .save(Checkpoint::new(
                run_id,
                step_index,
                position.clone(),
                state.snapshot(),
            ))
            .await
    }

    /// Convenience entry point: resolve the run identifier and step limit
    /// from a [`RunConfig`], returning the identifier alongside the final
    /// snapshot so callers can inspect checkpoints afterwards.
    pub async fn run_configured(
        &self,
        config: &RunConfig,
        seed: StateUpdate,
    ) -> Result<(String, StateSnapshot), RunError> {
        let run_id = config
            .run_id
            .clone()
            .unwrap_or_else(crate::utils::ids::run_id);
        // Per-run limit override without rebuilding the executor.
        let scoped = Executor {
            graph: self.graph.clone(),
            store: self.store.clone(),
            step_limit: config.step_limit,
        };
        let snapshot = scoped.run(&run_id, seed).await?;
        Ok((run_id, snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::state::StateSchema;
    use crate::testing::{
        FailingStep, FixedRouter, InvocationLog, RecordingStep, SeededRouter, WritingStep,
    };
    use crate::utils::rng::DeterministicRng;

    fn trace_schema() -> StateSchema {
        StateSchema::builder().field("trace").field("label").build()
    }

    #[tokio::test]
    async fn test_linear_run_reaches_end() {
        let log = InvocationLog::default();
        let graph = GraphBuilder::new()
            .with_schema(trace_schema())
            .add_step("a", RecordingStep::new("a", &log))
            .add_step("b", RecordingStep::new("b", &log))
            .add_edge("a", "b")
            .add_edge("b", StepKind::End)
            .set_entry("a")
            .compile()
            .unwrap();

        let executor = Executor::new(graph);
        let snapshot = executor.run("run-1", StateUpdate::new()).await.unwrap();
        assert_eq!(log.entries(), vec!["a", "b"]);
        assert_eq!(snapshot.text("trace"), "b");
    }

    #[tokio::test]
    async fn test_checkpoint_saved_after_each_node() {
        let log = InvocationLog::default();
        let graph = GraphBuilder::new()
            .with_schema(trace_schema())
            .add_step("a", RecordingStep::new("a", &log))
            .add_step("b", RecordingStep::new("b", &log))
            .add_edge("a", "b")
            .add_edge("b", StepKind::End)
            .set_entry("a")
            .compile()
            .unwrap();

        let executor = Executor::new(graph);
        executor.run("run-1", StateUpdate::new()).await.unwrap();

        let cp = executor
            .checkpoints()
            .load_latest("run-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cp.step_index, 2);
        assert_eq!(cp.position, StepKind::named("b"));
        assert_eq!(cp.state.text("trace"), "b");
    }

    #[tokio::test]
    async fn test_failing_step_leaves_last_checkpoint_intact() {
        let log = InvocationLog::default();
        let graph = GraphBuilder::new()
            .with_schema(trace_schema())
            .add_step("a", RecordingStep::new("a", &log))
            .add_step("boom", FailingStep::new("label"))
            .add_edge("a", "boom")
            .add_edge("boom", StepKind::End)
            .set_entry("a")
            .compile()
            .unwrap();

        let executor = Executor::new(graph);
        let err = executor.run("run-1", StateUpdate::new()).await.unwrap_err();
        assert!(matches!(err, RunError::Step { ref node, .. } if node == "Step:boom"));

        // The checkpoint from the last successful node is still readable.
        let cp = executor
            .checkpoints()
            .load_latest("run-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(cp.position, StepKind::named("a"));
        assert_eq!(cp.state.text("trace"), "a");
    }

    #[tokio::test]
    async fn test_binary_router_end_stops_immediately() {
        let log = InvocationLog::default();
        let graph = GraphBuilder::new()
            .with_schema(trace_schema())
            .add_step("entry", RecordingStep::new("entry", &log))
            .add_step("after", RecordingStep::new("after", &log))
            .add_router(
                "continuation",
                FixedRouter::new("end", &["continue", "end"]),
                [("continue", "after".into()), ("end", StepKind::End)],
            )
            .add_edge("entry", "continuation")
            .add_edge("after", StepKind::End)
            .set_entry("entry")
            .compile()
            .unwrap();

        let executor = Executor::new(graph);
        let snapshot = executor.run("run-1", StateUpdate::new()).await.unwrap();
        // Only the entry step ran; the router's "end" went straight to the
        // terminal sentinel.
        assert_eq!(log.entries(), vec!["entry"]);
        assert_eq!(snapshot.text("trace"), "entry");
    }

    #[tokio::test]
    async fn test_binary_router_continue_proceeds() {
        let log = InvocationLog::default();
        let graph = GraphBuilder::new()
            .with_schema(trace_schema())
            .add_step("entry", RecordingStep::new("entry", &log))
            .add_step("after", RecordingStep::new("after", &log))
            .add_router(
                "continuation",
                FixedRouter::new("continue", &["continue", "end"]),
                [("continue", "after".into()), ("end", StepKind::End)],
            )
            .add_edge("entry", "continuation")
            .add_edge("after", StepKind::End)
            .set_entry("entry")
            .compile()
            .unwrap();

        let executor = Executor::new(graph);
        executor.run("run-1", StateUpdate::new()).await.unwrap();
        assert_eq!(log.entries(), vec!["entry", "after"]);
    }

    #[tokio::test]
    async fn test_unknown_outcome_is_graph_integrity_error() {
        // FixedRouter declares the label it produces, but we bypass coverage
        // validation by declaring a superset and wiring only part of it --
        // impossible through compile(), so simulate with a router that lies:
        // it declares ["a", "b"], edges cover both, but produces "c".
        let log = InvocationLog::default();
        let graph = GraphBuilder::new()
            .with_schema(trace_schema())
            .add_step("entry", RecordingStep::new("entry", &log))
            .add_router(
                "r",
                FixedRouter::new("c", &["a", "b"]),
                [("a", StepKind::End), ("b", StepKind::End)],
            )
            .add_edge("entry", "r")
            .set_entry("entry")
            .compile()
            .unwrap();

        let executor = Executor::new(graph);
        let err = executor.run("run-1", StateUpdate::new()).await.unwrap_err();
        match err {
            RunError::UnknownOutcome { node, outcome } => {
                assert_eq!(node, "Step:r");
                assert_eq!(outcome, "c");
            }
            other => panic!("expected UnknownOutcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_step_limit_guard_fires_on_router_loop() {
        let log = InvocationLog::default();
        let graph = GraphBuilder::new()
            .with_schema(trace_schema())
            .add_step("work", RecordingStep::new("work", &log))
            .add_router(
                "again",
                FixedRouter::new("loop", &["loop", "leave"]),
                [("loop", "work".into()), ("leave", StepKind::End)],
            )
            .add_edge("work", "again")
            .set_entry("work")
            .compile()
            .unwrap();

        let executor = Executor::new(graph).step_limit(Some(10));
        let err = executor.run("run-1", StateUpdate::new()).await.unwrap_err();
        assert!(matches!(err, RunError::StepLimitExceeded { limit: 10 }));
    }

    #[tokio::test]
    async fn test_undeclared_write_fails_run() {
        let graph = GraphBuilder::new()
            .with_schema(StateSchema::builder().field("trace").build())
            .add_step("rogue", WritingStep::new("unknown_field", "x"))
            .add_edge("rogue", StepKind::End)
            .set_entry("rogue")
            .compile()
            .unwrap();

        let executor = Executor::new(graph);
        let err = executor.run("run-1", StateUpdate::new()).await.unwrap_err();
        assert!(matches!(err, RunError::State(StateError::UndeclaredField { .. })));
    }

    #[tokio::test]
    async fn test_run_configured_generates_run_id() {
        let log = InvocationLog::default();
        let graph = GraphBuilder::new()
            .with_schema(trace_schema())
            .add_step("a", RecordingStep::new("a", &log))
            .add_edge("a", StepKind::End)
            .set_entry("a")
            .compile()
            .unwrap();

        let executor = Executor::new(graph);
        let (run_id, snapshot) = executor
            .run_configured(&RunConfig::default(), StateUpdate::new())
            .await
            .unwrap();
        assert!(run_id.starts_with("run-"));
        assert_eq!(snapshot.text("trace"), "a");
        assert!(executor
            .checkpoints()
            .load_latest(&run_id)
            .await
            .unwrap()
            .is_some());
    }

    /// Randomly generated forward-only graphs (acyclic except at routers,
    /// which here also only point forward) must reach the terminal sentinel
    /// within a bounded number of steps.
    #[tokio::test]
    async fn test_random_forward_graphs_terminate() {
        for seed in 0..25u64 {
            let mut rng = DeterministicRng::new(seed);
            let node_count = 2 + rng.random_range(0, 10);
            let log = InvocationLog::default();

            let mut builder = GraphBuilder::new().with_schema(trace_schema());
            for i in 0..node_count {
                let name = format!("n{i}");
                // Targets always point past the current node, End included.
                let target = |rng: &mut DeterministicRng| -> StepKind {
                    let j = i + 1 + rng.random_range(0, node_count - i);
                    if j >= node_count {
                        StepKind::End
                    } else {
                        StepKind::named(format!("n{j}"))
                    }
                };
                if rng.random_bool() {
                    let first = target(&mut rng);
                    let second = target(&mut rng);
                    builder = builder.add_router(
                        name.as_str(),
                        SeededRouter::new(seed + i as u64, &["left", "right"]),
                        [("left", first), ("right", second)],
                    );
                } else {
                    let next = target(&mut rng);
                    builder = builder
                        .add_step(name.as_str(), RecordingStep::new("n", &log))
                        .add_edge(name.as_str(), next);
                }
            }
            let graph = builder.set_entry("n0").compile().unwrap();

            let executor = Executor::new(graph).step_limit(Some(node_count as u64 + 1));
            let result = executor
                .run(&format!("fuzz-{seed}"), StateUpdate::new())
                .await;
            assert!(result.is_ok(), "seed {seed} failed: {result:?}");
        }
    }
}
