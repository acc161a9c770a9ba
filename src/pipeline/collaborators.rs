//! External collaborator interfaces for the email pipeline.
//!
//! The executor core never performs I/O of its own; every external effect
//! lives behind one of these traits, injected explicitly into the steps that
//! need it. Each trait returns typed results: when a backing service yields
//! output the collaborator cannot interpret (e.g. a model response that is
//! not the JSON it promised), the collaborator reports
//! [`CollaboratorError::Unparseable`] instead of handing loose text back for
//! the pipeline to re-parse.

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::step::StepError;

/// Errors from external collaborator calls.
#[derive(Debug, Error, Diagnostic)]
pub enum CollaboratorError {
    #[error("{service} unavailable: {message}")]
    #[diagnostic(code(draftflow::collaborator::unavailable))]
    Unavailable {
        service: &'static str,
        message: String,
    },

    /// The backing service answered, but not in the promised shape.
    #[error("unparseable {what} response")]
    #[diagnostic(
        code(draftflow::collaborator::unparseable),
        help("The collaborator owns its output contract; fix the parsing there.")
    )]
    Unparseable { what: &'static str },
}

impl From<CollaboratorError> for StepError {
    fn from(err: CollaboratorError) -> Self {
        StepError::collaborator(err)
    }
}

/// Whether an inbound email deserves processing past classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContinuationDecision {
    Continue,
    Stop,
}

/// Typed result of the rejection-strategy analysis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectionStrategy {
    pub rejection_type: String,
    pub challenge_angles: Vec<String>,
}

/// Typed result of client document extraction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DocumentExtraction {
    /// Human-readable outcome of the extraction attempt.
    pub status: String,
    /// Content of the most relevant client document, when one was found.
    pub content: Option<String>,
    /// Link to the client folder, when one was identified.
    pub folder_url: Option<String>,
}

/// Payload for a reviewer notification.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReviewRequest {
    pub note: String,
    pub draft: String,
    pub sender_email: String,
    pub subject: String,
    pub document_url: Option<String>,
}

/// Language model calls the pipeline depends on.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Classify an inbound email into one of the known labels.
    async fn classify(&self, email_text: &str) -> Result<String, CollaboratorError>;

    /// Decide whether processing should continue past classification.
    async fn continuation_decision(
        &self,
        email_text: &str,
    ) -> Result<ContinuationDecision, CollaboratorError>;

    /// Produce a retrieval query for finding similar past threads.
    async fn vector_query(&self, email_text: &str) -> Result<String, CollaboratorError>;

    /// Analyse a rejection email and propose counter-angles.
    async fn rejection_strategy(
        &self,
        email_text: &str,
        label: &str,
    ) -> Result<RejectionStrategy, CollaboratorError>;

    /// Draft a push-back reply for a soft rejection.
    async fn soft_rejection_draft(
        &self,
        email_text: &str,
        label: &str,
        challenge_angles: &[String],
    ) -> Result<String, CollaboratorError>;

    /// Draft a reply using example threads and optional document context.
    async fn draft_reply(
        &self,
        email_text: &str,
        example_threads: &[String],
        document_context: Option<&str>,
    ) -> Result<String, CollaboratorError>;

    /// Polish a draft against the original email.
    async fn edit_draft(&self, email_text: &str, draft: &str)
        -> Result<String, CollaboratorError>;

    /// Summarize the email for the reviewer notification.
    async fn notification_summary(&self, email_text: &str) -> Result<String, CollaboratorError>;
}

/// Archive of past email threads, searchable by semantic query.
#[async_trait]
pub trait ThreadArchive: Send + Sync {
    async fn fetch_threads(
        &self,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<String>, CollaboratorError>;
}

/// Remote file store holding per-client document folders.
#[async_trait]
pub trait DocumentVault: Send + Sync {
    /// Locate the client the email concerns and pull its most relevant
    /// document. A miss is not an error: it is a [`DocumentExtraction`]
    /// whose `content` is `None` and whose `status` says why.
    async fn extract_client_documents(
        &self,
        email_text: &str,
    ) -> Result<DocumentExtraction, CollaboratorError>;
}

/// Chat channel used to ask a human to review the draft.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Deliver a review request; returns a delivery status string.
    async fn send_review_request(
        &self,
        request: ReviewRequest,
    ) -> Result<String, CollaboratorError>;
}

/// Mailbox capable of creating reply drafts.
#[async_trait]
pub trait MailDrafts: Send + Sync {
    /// Create a draft reply; returns a creation status string.
    async fn create_draft(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, CollaboratorError>;
}
