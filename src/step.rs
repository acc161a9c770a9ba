//! Step and router abstractions.
//!
//! A [`Step`] is a named unit of work: a function of the current state
//! snapshot producing a partial update (and, incidentally, permitted to cause
//! external side effects through the collaborator handles it holds). A
//! [`Router`] produces a discrete outcome label drawn from a finite set
//! declared at graph-build time; the graph maps each label to a successor.
//!
//! Both traits are object-safe and async so implementations may block on
//! external I/O. Neither may assume field presence beyond what upstream steps
//! in its declared predecessor chain guarantee.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::state::{StateSnapshot, StateUpdate};

/// Execution context handed to each step or router invocation.
#[derive(Clone, Debug)]
pub struct StepContext {
    /// Encoded identity of the node being invoked.
    pub node_id: String,
    /// 1-based position of this invocation within the run.
    pub step_index: u64,
}

/// Errors raised from inside a step or router body.
#[derive(Debug, Error, Diagnostic)]
pub enum StepError {
    /// A field the step requires was never set by its predecessors.
    #[error("missing required input: {what}")]
    #[diagnostic(
        code(draftflow::step::missing_input),
        help("Ensure an upstream step in the chain sets this field.")
    )]
    MissingInput { what: &'static str },

    /// An external collaborator call failed.
    #[error("collaborator call failed: {source}")]
    #[diagnostic(code(draftflow::step::collaborator))]
    Collaborator {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl StepError {
    pub fn collaborator(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        StepError::Collaborator {
            source: Box::new(source),
        }
    }
}

/// A graph node that transforms state.
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, snapshot: StateSnapshot, ctx: StepContext)
        -> Result<StateUpdate, StepError>;
}

/// A graph node that selects the next node via a discrete outcome label.
#[async_trait]
pub trait Router: Send + Sync {
    /// The finite set of labels this router may produce. The graph builder
    /// verifies that registered edges cover exactly this set.
    fn outcomes(&self) -> &[&'static str];

    async fn route(&self, snapshot: StateSnapshot, ctx: StepContext)
        -> Result<String, StepError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RunState, StateSchema};
    use std::sync::Arc;

    struct EchoStep;

    #[async_trait]
    impl Step for EchoStep {
        async fn run(
            &self,
            snapshot: StateSnapshot,
            ctx: StepContext,
        ) -> Result<StateUpdate, StepError> {
            if snapshot.text("email_text").is_empty() {
                return Err(StepError::MissingInput { what: "email_text" });
            }
            Ok(StateUpdate::new().set_text("label", format!("seen at {}", ctx.step_index)))
        }
    }

    fn snapshot_with(email_text: &str) -> StateSnapshot {
        let schema = Arc::new(
            StateSchema::builder()
                .field("email_text")
                .field("label")
                .build(),
        );
        let mut state = RunState::new(schema);
        if !email_text.is_empty() {
            state
                .merge(StateUpdate::new().set_text("email_text", email_text))
                .unwrap();
        }
        state.snapshot()
    }

    #[tokio::test]
    async fn test_step_missing_input() {
        let ctx = StepContext {
            node_id: "Step:classify".into(),
            step_index: 1,
        };
        let err = EchoStep.run(snapshot_with(""), ctx).await.unwrap_err();
        assert!(matches!(err, StepError::MissingInput { what: "email_text" }));
    }

    #[tokio::test]
    async fn test_step_partial_update() {
        let ctx = StepContext {
            node_id: "Step:classify".into(),
            step_index: 3,
        };
        let update = EchoStep.run(snapshot_with("hi"), ctx).await.unwrap();
        assert_eq!(update.len(), 1);
    }
}
