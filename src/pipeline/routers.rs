//! Routers for the email pipeline.

use async_trait::async_trait;
use std::sync::Arc;

use crate::pipeline::collaborators::{ContinuationDecision, LanguageModel};
use crate::pipeline::{fields, outcomes};
use crate::state::StateSnapshot;
use crate::step::{Router, StepContext, StepError};

/// Classification labels that divert a run onto the rejection branch.
/// Membership is an exact, case-sensitive string comparison.
pub const REJECTION_LABELS: [&str; 3] = [
    "Identity-based rejection",
    "Topic-based rejection",
    "Qualification-based rejection",
];

/// Binary router deciding whether a run proceeds past classification.
///
/// `end` routes directly to the terminal sentinel; `continue` hands the run
/// to the rejection routing.
pub struct ContinuationRouter {
    model: Arc<dyn LanguageModel>,
}

impl ContinuationRouter {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Router for ContinuationRouter {
    fn outcomes(&self) -> &[&'static str] {
        &[outcomes::CONTINUE, outcomes::END]
    }

    async fn route(
        &self,
        snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<String, StepError> {
        let email_text = snapshot.text(fields::EMAIL_TEXT);
        if email_text.is_empty() {
            return Err(StepError::MissingInput {
                what: fields::EMAIL_TEXT,
            });
        }
        let decision = self.model.continuation_decision(email_text).await?;
        Ok(match decision {
            ContinuationDecision::Continue => outcomes::CONTINUE.to_string(),
            ContinuationDecision::Stop => outcomes::END.to_string(),
        })
    }
}

/// Set-membership router: an exact rejection label takes the rejection
/// branch, anything else the standard pipeline. No collaborator involved.
pub struct RejectionRouter;

#[async_trait]
impl Router for RejectionRouter {
    fn outcomes(&self) -> &[&'static str] {
        &[outcomes::HANDLE_REJECTION, outcomes::STANDARD_PIPELINE]
    }

    async fn route(
        &self,
        snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<String, StepError> {
        let label = snapshot.text(fields::LABEL);
        let outcome = if REJECTION_LABELS.iter().any(|l| *l == label) {
            outcomes::HANDLE_REJECTION
        } else {
            outcomes::STANDARD_PIPELINE
        };
        Ok(outcome.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RunState, StateUpdate};

    fn ctx() -> StepContext {
        StepContext {
            node_id: "Step:test".into(),
            step_index: 2,
        }
    }

    fn snapshot_with_label(label: &str) -> StateSnapshot {
        RunState::seeded(
            std::sync::Arc::new(crate::pipeline::schema()),
            StateUpdate::new().set_text(fields::LABEL, label),
        )
        .unwrap()
        .snapshot()
    }

    #[tokio::test]
    async fn test_rejection_label_routes_to_rejection_branch() {
        let outcome = RejectionRouter
            .route(snapshot_with_label("Identity-based rejection"), ctx())
            .await
            .unwrap();
        assert_eq!(outcome, outcomes::HANDLE_REJECTION);
    }

    #[tokio::test]
    async fn test_accepted_routes_to_standard_branch() {
        let outcome = RejectionRouter
            .route(snapshot_with_label("Accepted"), ctx())
            .await
            .unwrap();
        assert_eq!(outcome, outcomes::STANDARD_PIPELINE);
    }

    #[tokio::test]
    async fn test_membership_is_case_sensitive() {
        // A label differing only in case must NOT match the rejection set.
        let outcome = RejectionRouter
            .route(snapshot_with_label("identity-based rejection"), ctx())
            .await
            .unwrap();
        assert_eq!(outcome, outcomes::STANDARD_PIPELINE);
    }

    #[tokio::test]
    async fn test_unset_label_takes_standard_branch() {
        let snapshot = RunState::new(std::sync::Arc::new(crate::pipeline::schema())).snapshot();
        let outcome = RejectionRouter.route(snapshot, ctx()).await.unwrap();
        assert_eq!(outcome, outcomes::STANDARD_PIPELINE);
    }
}
