//! Workflow graph definition, compilation, and validation.
//!
//! A graph is declared through [`GraphBuilder`]: steps, routers, static
//! edges (one successor per step), router outcome tables, a state schema,
//! and one entry node. [`GraphBuilder::compile`] validates the whole
//! declaration and returns an immutable [`Graph`]; every malformed topology
//! is a build-time [`GraphError`] and never surfaces mid-run.
//!
//! Validation rules:
//! - the entry node is set and declared;
//! - every edge source is a declared step (routers advance via outcomes);
//! - every edge and outcome target is a declared node or [`StepKind::End`];
//! - each router's registered outcome table covers its declared outcome set
//!   exactly, in both directions;
//! - no cycle exists among unconditional edges (such a cycle cannot be left
//!   and would loop forever);
//! - every node reachable from the entry has a successor, so traversal can
//!   always make progress toward the terminal sentinel.

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;
use thiserror::Error;

use crate::state::StateSchema;
use crate::step::{Router, Step};
use crate::types::StepKind;

/// Errors detected while compiling a graph declaration.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("graph has no state schema")]
    #[diagnostic(
        code(draftflow::graph::missing_schema),
        help("Attach the declared field set with GraphBuilder::with_schema.")
    )]
    MissingSchema,

    #[error("graph has no entry node")]
    #[diagnostic(
        code(draftflow::graph::missing_entry),
        help("Designate the entry with GraphBuilder::set_entry.")
    )]
    MissingEntry,

    #[error("entry node is not declared: {entry}")]
    #[diagnostic(code(draftflow::graph::unknown_entry))]
    UnknownEntry { entry: String },

    #[error("node declared more than once: {node}")]
    #[diagnostic(code(draftflow::graph::duplicate_node))]
    DuplicateNode { node: String },

    #[error("step has more than one static successor: {from}")]
    #[diagnostic(
        code(draftflow::graph::duplicate_edge),
        help("A step has exactly one unconditional successor; use a router to branch.")
    )]
    DuplicateEdge { from: String },

    #[error("edge source is not a declared step: {from}")]
    #[diagnostic(code(draftflow::graph::unknown_edge_source))]
    UnknownEdgeSource { from: String },

    #[error("edge source is a router: {from}")]
    #[diagnostic(
        code(draftflow::graph::edge_from_router),
        help("Routers advance through their outcome table, not static edges.")
    )]
    EdgeFromRouter { from: String },

    #[error("edge target is not declared: {from} -> {to}")]
    #[diagnostic(code(draftflow::graph::unknown_target))]
    UnknownTarget { from: String, to: String },

    #[error("router declares no outcomes: {router}")]
    #[diagnostic(code(draftflow::graph::empty_outcomes))]
    EmptyOutcomes { router: String },

    #[error("router {router} registers an edge for undeclared outcome {outcome:?}")]
    #[diagnostic(code(draftflow::graph::undeclared_outcome))]
    UndeclaredOutcome { router: String, outcome: String },

    #[error("router {router} declares outcome {outcome:?} but registers no edge for it")]
    #[diagnostic(
        code(draftflow::graph::unrouted_outcome),
        help("Every declared outcome needs a successor or the terminal sentinel.")
    )]
    UnroutedOutcome { router: String, outcome: String },

    #[error("reachable node has no successor: {node}")]
    #[diagnostic(
        code(draftflow::graph::dangling_node),
        help("Add an edge to another node or to the terminal sentinel.")
    )]
    DanglingNode { node: String },

    #[error("cycle among unconditional edges: {}", nodes.join(" -> "))]
    #[diagnostic(
        code(draftflow::graph::unconditional_cycle),
        help("A cycle with no router on it can never terminate; break it with a router.")
    )]
    UnconditionalCycle { nodes: Vec<String> },
}

pub(crate) struct RouterNode {
    pub router: Arc<dyn Router>,
    pub outcomes: FxHashMap<String, StepKind>,
}

/// Builder for a [`Graph`].
#[derive(Default)]
pub struct GraphBuilder {
    steps: FxHashMap<StepKind, Arc<dyn Step>>,
    routers: FxHashMap<StepKind, RouterNode>,
    edges: FxHashMap<StepKind, StepKind>,
    entry: Option<StepKind>,
    schema: Option<StateSchema>,
    duplicate_nodes: Vec<StepKind>,
    duplicate_edges: Vec<StepKind>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(mut self, schema: StateSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn add_step(mut self, id: impl Into<StepKind>, step: impl Step + 'static) -> Self {
        let id = id.into();
        if self.steps.contains_key(&id) || self.routers.contains_key(&id) {
            self.duplicate_nodes.push(id);
        } else {
            self.steps.insert(id, Arc::new(step));
        }
        self
    }

    pub fn add_router<I>(
        mut self,
        id: impl Into<StepKind>,
        router: impl Router + 'static,
        outcomes: I,
    ) -> Self
    where
        I: IntoIterator<Item = (&'static str, StepKind)>,
    {
        let id = id.into();
        if self.steps.contains_key(&id) || self.routers.contains_key(&id) {
            self.duplicate_nodes.push(id);
        } else {
            let table = outcomes
                .into_iter()
                .map(|(label, target)| (label.to_string(), target))
                .collect();
            self.routers.insert(
                id,
                RouterNode {
                    router: Arc::new(router),
                    outcomes: table,
                },
            );
        }
        self
    }

    pub fn add_edge(mut self, from: impl Into<StepKind>, to: impl Into<StepKind>) -> Self {
        let from = from.into();
        if self.edges.insert(from.clone(), to.into()).is_some() {
            self.duplicate_edges.push(from);
        }
        self
    }

    pub fn set_entry(mut self, entry: impl Into<StepKind>) -> Self {
        self.entry = Some(entry.into());
        self
    }

    /// Validate the declaration and produce an immutable [`Graph`].
    pub fn compile(self) -> Result<Graph, GraphError> {
        let GraphBuilder {
            steps,
            routers,
            edges,
            entry,
            schema,
            duplicate_nodes,
            duplicate_edges,
        } = self;
        let schema = schema.ok_or(GraphError::MissingSchema)?;
        let entry = entry.ok_or(GraphError::MissingEntry)?;

        if let Some(node) = duplicate_nodes.first() {
            return Err(GraphError::DuplicateNode {
                node: node.encode(),
            });
        }
        if let Some(from) = duplicate_edges.first() {
            return Err(GraphError::DuplicateEdge {
                from: from.encode(),
            });
        }

        let declared = |id: &StepKind| steps.contains_key(id) || routers.contains_key(id);

        if !declared(&entry) {
            return Err(GraphError::UnknownEntry {
                entry: entry.encode(),
            });
        }

        for (from, to) in &edges {
            if routers.contains_key(from) {
                return Err(GraphError::EdgeFromRouter {
                    from: from.encode(),
                });
            }
            if !steps.contains_key(from) {
                return Err(GraphError::UnknownEdgeSource {
                    from: from.encode(),
                });
            }
            if !to.is_end() && !declared(to) {
                return Err(GraphError::UnknownTarget {
                    from: from.encode(),
                    to: to.encode(),
                });
            }
        }

        for (id, node) in &routers {
            let declared_outcomes = node.router.outcomes();
            if declared_outcomes.is_empty() {
                return Err(GraphError::EmptyOutcomes {
                    router: id.encode(),
                });
            }
            for (label, target) in &node.outcomes {
                if !declared_outcomes.iter().any(|o| *o == label.as_str()) {
                    return Err(GraphError::UndeclaredOutcome {
                        router: id.encode(),
                        outcome: label.clone(),
                    });
                }
                if !target.is_end() && !declared(target) {
                    return Err(GraphError::UnknownTarget {
                        from: id.encode(),
                        to: target.encode(),
                    });
                }
            }
            for label in declared_outcomes {
                if !node.outcomes.contains_key(*label) {
                    return Err(GraphError::UnroutedOutcome {
                        router: id.encode(),
                        outcome: (*label).to_string(),
                    });
                }
            }
        }

        Self::check_unconditional_cycles(&edges)?;
        Self::check_reachable_successors(&steps, &routers, &edges, &entry)?;

        Ok(Graph {
            steps,
            routers,
            edges,
            entry,
            schema: Arc::new(schema),
        })
    }

    /// Walk the static-edge graph (at most one successor per node) and
    /// reject any cycle: routers carry no static edges, so such a cycle
    /// consists only of unconditional hops and can never be left.
    fn check_unconditional_cycles(
        edges: &FxHashMap<StepKind, StepKind>,
    ) -> Result<(), GraphError> {
        let mut settled: FxHashSet<StepKind> = FxHashSet::default();
        for start in edges.keys() {
            if settled.contains(start) {
                continue;
            }
            let mut path: Vec<StepKind> = Vec::new();
            let mut on_path: FxHashSet<StepKind> = FxHashSet::default();
            let mut cursor = Some(start.clone());
            while let Some(node) = cursor {
                if on_path.contains(&node) {
                    let at = path.iter().position(|n| *n == node).unwrap_or(0);
                    let mut nodes: Vec<String> =
                        path[at..].iter().map(StepKind::encode).collect();
                    nodes.push(node.encode());
                    return Err(GraphError::UnconditionalCycle { nodes });
                }
                if settled.contains(&node) {
                    break;
                }
                on_path.insert(node.clone());
                path.push(node.clone());
                cursor = edges.get(&node).cloned();
            }
            settled.extend(path);
        }
        Ok(())
    }

    /// Every node reachable from the entry must have an outgoing edge or a
    /// router outcome table, so traversal always makes progress.
    fn check_reachable_successors(
        steps: &FxHashMap<StepKind, Arc<dyn Step>>,
        routers: &FxHashMap<StepKind, RouterNode>,
        edges: &FxHashMap<StepKind, StepKind>,
        entry: &StepKind,
    ) -> Result<(), GraphError> {
        let mut seen: FxHashSet<StepKind> = FxHashSet::default();
        let mut queue: Vec<StepKind> = vec![entry.clone()];
        seen.insert(entry.clone());
        while let Some(node) = queue.pop() {
            let mut successors: Vec<StepKind> = Vec::new();
            if steps.contains_key(&node) {
                match edges.get(&node) {
                    Some(next) => successors.push(next.clone()),
                    None => {
                        return Err(GraphError::DanglingNode {
                            node: node.encode(),
                        })
                    }
                }
            } else if let Some(router) = routers.get(&node) {
                successors.extend(router.outcomes.values().cloned());
            }
            for next in successors {
                if !next.is_end() && seen.insert(next.clone()) {
                    queue.push(next);
                }
            }
        }
        Ok(())
    }
}

/// A compiled, validated workflow graph.
pub struct Graph {
    steps: FxHashMap<StepKind, Arc<dyn Step>>,
    routers: FxHashMap<StepKind, RouterNode>,
    edges: FxHashMap<StepKind, StepKind>,
    entry: StepKind,
    schema: Arc<StateSchema>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .field("routers", &self.routers.keys().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .field("entry", &self.entry)
            .finish()
    }
}

impl Graph {
    pub fn entry(&self) -> &StepKind {
        &self.entry
    }

    pub fn schema(&self) -> Arc<StateSchema> {
        self.schema.clone()
    }

    pub(crate) fn step(&self, id: &StepKind) -> Option<&Arc<dyn Step>> {
        self.steps.get(id)
    }

    pub(crate) fn router(&self, id: &StepKind) -> Option<&RouterNode> {
        self.routers.get(id)
    }

    pub(crate) fn successor_of(&self, id: &StepKind) -> Option<&StepKind> {
        self.edges.get(id)
    }

    pub fn contains(&self, id: &StepKind) -> bool {
        self.steps.contains_key(id) || self.routers.contains_key(id)
    }

    pub fn node_count(&self) -> usize {
        self.steps.len() + self.routers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixedRouter, MarkerStep};

    fn schema() -> StateSchema {
        StateSchema::builder().field("trace").build()
    }

    fn marker(name: &'static str) -> MarkerStep {
        MarkerStep { name }
    }

    #[test]
    fn test_compile_minimal_chain() {
        let graph = GraphBuilder::new()
            .with_schema(schema())
            .add_step("a", marker("a"))
            .add_step("b", marker("b"))
            .add_edge("a", "b")
            .add_edge("b", StepKind::End)
            .set_entry("a")
            .compile()
            .unwrap();
        assert_eq!(graph.entry(), &StepKind::named("a"));
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn test_missing_schema_rejected() {
        let err = GraphBuilder::new()
            .add_step("a", marker("a"))
            .add_edge("a", StepKind::End)
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::MissingSchema));
    }

    #[test]
    fn test_missing_and_unknown_entry_rejected() {
        let err = GraphBuilder::new()
            .with_schema(schema())
            .add_step("a", marker("a"))
            .add_edge("a", StepKind::End)
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::MissingEntry));

        let err = GraphBuilder::new()
            .with_schema(schema())
            .add_step("a", marker("a"))
            .add_edge("a", StepKind::End)
            .set_entry("ghost")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownEntry { .. }));
    }

    #[test]
    fn test_dangling_edge_target_rejected() {
        let err = GraphBuilder::new()
            .with_schema(schema())
            .add_step("a", marker("a"))
            .add_edge("a", "ghost")
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownTarget { .. }));
    }

    #[test]
    fn test_duplicate_node_and_edge_rejected() {
        let err = GraphBuilder::new()
            .with_schema(schema())
            .add_step("a", marker("a"))
            .add_step("a", marker("a2"))
            .add_edge("a", StepKind::End)
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode { .. }));

        let err = GraphBuilder::new()
            .with_schema(schema())
            .add_step("a", marker("a"))
            .add_step("b", marker("b"))
            .add_edge("a", "b")
            .add_edge("a", StepKind::End)
            .add_edge("b", StepKind::End)
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::DuplicateEdge { .. }));
    }

    #[test]
    fn test_router_coverage_both_directions() {
        // Registered edge for an outcome the router never produces.
        let err = GraphBuilder::new()
            .with_schema(schema())
            .add_step("a", marker("a"))
            .add_router(
                "r",
                FixedRouter::new("yes", &["yes"]),
                [("yes", StepKind::End), ("no", StepKind::End)],
            )
            .add_edge("a", "r")
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::UndeclaredOutcome { .. }));

        // Declared outcome with no registered edge.
        let err = GraphBuilder::new()
            .with_schema(schema())
            .add_step("a", marker("a"))
            .add_router(
                "r",
                FixedRouter::new("yes", &["yes", "no"]),
                [("yes", StepKind::End)],
            )
            .add_edge("a", "r")
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::UnroutedOutcome { .. }));
    }

    #[test]
    fn test_unconditional_cycle_rejected() {
        let err = GraphBuilder::new()
            .with_schema(schema())
            .add_step("a", marker("a"))
            .add_step("b", marker("b"))
            .add_step("c", marker("c"))
            .add_edge("a", "b")
            .add_edge("b", "c")
            .add_edge("c", "a")
            .set_entry("a")
            .compile()
            .unwrap_err();
        match err {
            GraphError::UnconditionalCycle { nodes } => assert!(nodes.len() >= 3),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_through_router_accepted() {
        // b -> r, and r can either loop back to b or leave to End: legal,
        // because the router is capable of leaving the loop.
        let graph = GraphBuilder::new()
            .with_schema(schema())
            .add_step("b", marker("b"))
            .add_router(
                "r",
                FixedRouter::new("leave", &["again", "leave"]),
                [("again", "b".into()), ("leave", StepKind::End)],
            )
            .add_edge("b", "r")
            .set_entry("b")
            .compile();
        assert!(graph.is_ok());
    }

    #[test]
    fn test_reachable_step_without_successor_rejected() {
        let err = GraphBuilder::new()
            .with_schema(schema())
            .add_step("a", marker("a"))
            .add_step("b", marker("b"))
            .add_edge("a", "b")
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::DanglingNode { node } if node == "Step:b"));
    }

    #[test]
    fn test_unreachable_step_without_successor_accepted() {
        // "orphan" is declared but unreachable; it cannot stall a run.
        let graph = GraphBuilder::new()
            .with_schema(schema())
            .add_step("a", marker("a"))
            .add_step("orphan", marker("orphan"))
            .add_edge("a", StepKind::End)
            .set_entry("a")
            .compile();
        assert!(graph.is_ok());
    }

    #[test]
    fn test_edge_from_router_rejected() {
        let err = GraphBuilder::new()
            .with_schema(schema())
            .add_step("a", marker("a"))
            .add_router("r", FixedRouter::new("go", &["go"]), [("go", StepKind::End)])
            .add_edge("a", "r")
            .add_edge("r", StepKind::End)
            .set_entry("a")
            .compile()
            .unwrap_err();
        assert!(matches!(err, GraphError::EdgeFromRouter { .. }));
    }
}
