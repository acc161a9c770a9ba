//! The email triage pipeline: the canonical graph this crate exists to run.
//!
//! An inbound email is classified, a continuation router decides whether the
//! run proceeds at all, and a set-membership router splits rejections from
//! standard mail. The two branches are disjoint chains that converge on the
//! draft-editing step; a shared tail notifies a reviewer and creates the
//! mail draft before reaching the terminal sentinel.
//!
//! ```text
//! classify -> continuation --end--> End
//!                |continue
//!          rejection_routing --handle_rejection--> rejection_strategy
//!                |standard_pipeline                      |
//!             gen_query -> retrieve            soft_rejection_draft
//!                |                                       |
//!          extract_documents -> generate_draft ----> edit_draft
//!                                                        |
//!                                          notify -> create_mail_draft -> End
//! ```
//!
//! All external effects go through the collaborator handles in
//! [`Collaborators`]; nothing here touches the network directly.

pub mod collaborators;
pub mod routers;
pub mod steps;

use std::sync::Arc;

use crate::graph::{Graph, GraphBuilder, GraphError};
use crate::state::{StateSchema, StateUpdate};
use crate::types::StepKind;

use collaborators::{DocumentVault, LanguageModel, MailDrafts, Messenger, ThreadArchive};
use routers::{ContinuationRouter, RejectionRouter};
use steps::{
    ClassifyStep, CreateMailDraftStep, EditDraftStep, ExtractDocumentsStep, GenerateDraftStep,
    GenerateQueryStep, NotifyStep, RejectionStrategyStep, RetrieveThreadsStep,
    SoftRejectionDraftStep,
};

/// Declared state field names.
pub mod fields {
    pub const EMAIL_TEXT: &str = "email_text";
    pub const SUBJECT: &str = "subject";
    pub const SENDER_NAME: &str = "sender_name";
    pub const SENDER_EMAIL: &str = "sender_email";
    pub const LABEL: &str = "label";
    pub const VECTOR_QUERY: &str = "vector_query";
    pub const RELEVANT_THREADS: &str = "relevant_threads";
    pub const DOCUMENT_CONTENT: &str = "document_content";
    pub const DOCUMENT_STATUS: &str = "document_status";
    pub const DOCUMENT_URL: &str = "document_url";
    pub const REJECTION_TYPE: &str = "rejection_type";
    pub const CHALLENGE_ANGLES: &str = "challenge_angles";
    pub const DRAFT: &str = "draft";
    pub const FINAL_DRAFT: &str = "final_draft";
    pub const NOTIFICATION_STATUS: &str = "notification_status";
    pub const DRAFT_STATUS: &str = "draft_status";
}

/// Router outcome labels.
pub mod outcomes {
    pub const CONTINUE: &str = "continue";
    pub const END: &str = "end";
    pub const HANDLE_REJECTION: &str = "handle_rejection";
    pub const STANDARD_PIPELINE: &str = "standard_pipeline";
}

/// Node names.
pub mod nodes {
    pub const CLASSIFY: &str = "classify";
    pub const CONTINUATION: &str = "continuation";
    pub const REJECTION_ROUTING: &str = "rejection_routing";
    pub const GEN_QUERY: &str = "gen_query";
    pub const RETRIEVE: &str = "retrieve";
    pub const EXTRACT_DOCUMENTS: &str = "extract_documents";
    pub const GENERATE_DRAFT: &str = "generate_draft";
    pub const REJECTION_STRATEGY: &str = "rejection_strategy";
    pub const SOFT_REJECTION_DRAFT: &str = "soft_rejection_draft";
    pub const EDIT_DRAFT: &str = "edit_draft";
    pub const NOTIFY: &str = "notify";
    pub const CREATE_MAIL_DRAFT: &str = "create_mail_draft";
}

/// The fixed field set every pipeline run may use.
pub fn schema() -> StateSchema {
    StateSchema::builder()
        .fields([
            fields::EMAIL_TEXT,
            fields::SUBJECT,
            fields::SENDER_NAME,
            fields::SENDER_EMAIL,
            fields::LABEL,
            fields::VECTOR_QUERY,
            fields::RELEVANT_THREADS,
            fields::DOCUMENT_CONTENT,
            fields::DOCUMENT_STATUS,
            fields::DOCUMENT_URL,
            fields::REJECTION_TYPE,
            fields::CHALLENGE_ANGLES,
            fields::DRAFT,
            fields::FINAL_DRAFT,
            fields::NOTIFICATION_STATUS,
            fields::DRAFT_STATUS,
        ])
        .build()
}

/// Explicitly constructed collaborator handles injected into the pipeline.
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn LanguageModel>,
    pub archive: Arc<dyn ThreadArchive>,
    pub vault: Arc<dyn DocumentVault>,
    pub messenger: Arc<dyn Messenger>,
    pub mailer: Arc<dyn MailDrafts>,
}

/// Build the canonical pipeline graph over the given collaborators.
pub fn build_graph(collaborators: &Collaborators) -> Result<Graph, GraphError> {
    use nodes::*;
    use outcomes::*;

    GraphBuilder::new()
        .with_schema(schema())
        .add_step(CLASSIFY, ClassifyStep::new(collaborators.model.clone()))
        .add_router(
            CONTINUATION,
            ContinuationRouter::new(collaborators.model.clone()),
            [(CONTINUE, REJECTION_ROUTING.into()), (END, StepKind::End)],
        )
        .add_router(
            REJECTION_ROUTING,
            RejectionRouter,
            [
                (HANDLE_REJECTION, REJECTION_STRATEGY.into()),
                (STANDARD_PIPELINE, GEN_QUERY.into()),
            ],
        )
        .add_step(
            GEN_QUERY,
            GenerateQueryStep::new(collaborators.model.clone()),
        )
        .add_step(
            RETRIEVE,
            RetrieveThreadsStep::new(collaborators.archive.clone()),
        )
        .add_step(
            EXTRACT_DOCUMENTS,
            ExtractDocumentsStep::new(collaborators.vault.clone()),
        )
        .add_step(
            GENERATE_DRAFT,
            GenerateDraftStep::new(collaborators.model.clone()),
        )
        .add_step(
            REJECTION_STRATEGY,
            RejectionStrategyStep::new(collaborators.model.clone()),
        )
        .add_step(
            SOFT_REJECTION_DRAFT,
            SoftRejectionDraftStep::new(collaborators.model.clone()),
        )
        .add_step(EDIT_DRAFT, EditDraftStep::new(collaborators.model.clone()))
        .add_step(
            NOTIFY,
            NotifyStep::new(
                collaborators.model.clone(),
                collaborators.messenger.clone(),
            ),
        )
        .add_step(
            CREATE_MAIL_DRAFT,
            CreateMailDraftStep::new(collaborators.mailer.clone()),
        )
        .set_entry(CLASSIFY)
        .add_edge(CLASSIFY, CONTINUATION)
        // Standard branch.
        .add_edge(GEN_QUERY, RETRIEVE)
        .add_edge(RETRIEVE, EXTRACT_DOCUMENTS)
        .add_edge(EXTRACT_DOCUMENTS, GENERATE_DRAFT)
        .add_edge(GENERATE_DRAFT, EDIT_DRAFT)
        // Rejection branch, converging on the same draft-editing step.
        .add_edge(REJECTION_STRATEGY, SOFT_REJECTION_DRAFT)
        .add_edge(SOFT_REJECTION_DRAFT, EDIT_DRAFT)
        // Shared tail.
        .add_edge(EDIT_DRAFT, NOTIFY)
        .add_edge(NOTIFY, CREATE_MAIL_DRAFT)
        .add_edge(CREATE_MAIL_DRAFT, StepKind::End)
        .compile()
}

/// Seed fields for one inbound email.
pub fn seed_for_email(
    email_text: impl Into<String>,
    subject: impl Into<String>,
    sender_name: impl Into<String>,
    sender_email: impl Into<String>,
) -> StateUpdate {
    StateUpdate::new()
        .set_text(fields::EMAIL_TEXT, email_text)
        .set_text(fields::SUBJECT, subject)
        .set_text(fields::SENDER_NAME, sender_name)
        .set_text(fields::SENDER_EMAIL, sender_email)
}
