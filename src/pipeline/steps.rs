//! Step implementations for the email pipeline.
//!
//! Each step reads only fields its declared predecessors guarantee and
//! returns only the fields it changes. Collaborator handles are injected at
//! construction; no step reaches for ambient state.

use async_trait::async_trait;
use std::sync::Arc;

use crate::pipeline::collaborators::{
    DocumentVault, LanguageModel, MailDrafts, Messenger, ReviewRequest, ThreadArchive,
};
use crate::pipeline::fields;
use crate::state::{StateSnapshot, StateUpdate};
use crate::step::{Step, StepContext, StepError};

fn require<'a>(snapshot: &'a StateSnapshot, field: &'static str) -> Result<&'a str, StepError> {
    let value = snapshot.text(field);
    if value.is_empty() {
        return Err(StepError::MissingInput { what: field });
    }
    Ok(value)
}

/// Labels the inbound email.
pub struct ClassifyStep {
    model: Arc<dyn LanguageModel>,
}

impl ClassifyStep {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Step for ClassifyStep {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        let email_text = require(&snapshot, fields::EMAIL_TEXT)?;
        let label = self.model.classify(email_text).await?;
        Ok(StateUpdate::new().set_text(fields::LABEL, label.trim()))
    }
}

/// Produces the retrieval query used to find similar past threads.
pub struct GenerateQueryStep {
    model: Arc<dyn LanguageModel>,
}

impl GenerateQueryStep {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Step for GenerateQueryStep {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        let email_text = require(&snapshot, fields::EMAIL_TEXT)?;
        let query = self.model.vector_query(email_text).await?;
        Ok(StateUpdate::new().set_text(fields::VECTOR_QUERY, query))
    }
}

/// Fetches reference threads from the archive.
pub struct RetrieveThreadsStep {
    archive: Arc<dyn ThreadArchive>,
    top_k: usize,
}

impl RetrieveThreadsStep {
    pub const DEFAULT_TOP_K: usize = 5;

    pub fn new(archive: Arc<dyn ThreadArchive>) -> Self {
        Self {
            archive,
            top_k: Self::DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }
}

#[async_trait]
impl Step for RetrieveThreadsStep {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        let query = require(&snapshot, fields::VECTOR_QUERY)?;
        let threads = self.archive.fetch_threads(query, self.top_k).await?;
        Ok(StateUpdate::new().set_list(fields::RELEVANT_THREADS, threads))
    }
}

/// Pulls the most relevant client document from the remote vault.
pub struct ExtractDocumentsStep {
    vault: Arc<dyn DocumentVault>,
}

impl ExtractDocumentsStep {
    pub fn new(vault: Arc<dyn DocumentVault>) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl Step for ExtractDocumentsStep {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        let email_text = require(&snapshot, fields::EMAIL_TEXT)?;
        let extraction = self.vault.extract_client_documents(email_text).await?;
        let mut update = StateUpdate::new().set_text(fields::DOCUMENT_STATUS, extraction.status);
        if let Some(content) = extraction.content {
            update = update.set_text(fields::DOCUMENT_CONTENT, content);
        }
        if let Some(url) = extraction.folder_url {
            update = update.set_text(fields::DOCUMENT_URL, url);
        }
        Ok(update)
    }
}

/// Drafts a reply from the reference threads and optional document context.
pub struct GenerateDraftStep {
    model: Arc<dyn LanguageModel>,
}

impl GenerateDraftStep {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Step for GenerateDraftStep {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        let email_text = require(&snapshot, fields::EMAIL_TEXT)?;
        let threads = snapshot.list(fields::RELEVANT_THREADS);
        let document_context = match snapshot.text(fields::DOCUMENT_CONTENT) {
            "" => None,
            content => Some(content),
        };
        let draft = self
            .model
            .draft_reply(email_text, threads, document_context)
            .await?;
        Ok(StateUpdate::new().set_text(fields::DRAFT, draft))
    }
}

/// Analyses a rejection email and records the counter-angles to take.
pub struct RejectionStrategyStep {
    model: Arc<dyn LanguageModel>,
}

impl RejectionStrategyStep {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Step for RejectionStrategyStep {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        let email_text = require(&snapshot, fields::EMAIL_TEXT)?;
        let label = require(&snapshot, fields::LABEL)?;
        let strategy = self.model.rejection_strategy(email_text, label).await?;
        Ok(StateUpdate::new()
            .set_text(fields::REJECTION_TYPE, strategy.rejection_type)
            .set_list(fields::CHALLENGE_ANGLES, strategy.challenge_angles))
    }
}

/// Drafts a push-back reply for a soft rejection.
pub struct SoftRejectionDraftStep {
    model: Arc<dyn LanguageModel>,
}

impl SoftRejectionDraftStep {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Step for SoftRejectionDraftStep {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        let email_text = require(&snapshot, fields::EMAIL_TEXT)?;
        let label = require(&snapshot, fields::LABEL)?;
        let angles = snapshot.list(fields::CHALLENGE_ANGLES);
        let draft = self
            .model
            .soft_rejection_draft(email_text, label, angles)
            .await?;
        Ok(StateUpdate::new().set_text(fields::DRAFT, draft))
    }
}

/// Polishes the draft into its final form.
pub struct EditDraftStep {
    model: Arc<dyn LanguageModel>,
}

impl EditDraftStep {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl Step for EditDraftStep {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        let email_text = require(&snapshot, fields::EMAIL_TEXT)?;
        let draft = require(&snapshot, fields::DRAFT)?;
        let final_draft = self.model.edit_draft(email_text, draft).await?;
        Ok(StateUpdate::new().set_text(fields::FINAL_DRAFT, final_draft))
    }
}

/// Sends the reviewer a summary plus the final draft.
pub struct NotifyStep {
    model: Arc<dyn LanguageModel>,
    messenger: Arc<dyn Messenger>,
}

impl NotifyStep {
    pub fn new(model: Arc<dyn LanguageModel>, messenger: Arc<dyn Messenger>) -> Self {
        Self { model, messenger }
    }
}

#[async_trait]
impl Step for NotifyStep {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        let email_text = require(&snapshot, fields::EMAIL_TEXT)?;
        let final_draft = require(&snapshot, fields::FINAL_DRAFT)?;

        let summary = self.model.notification_summary(email_text).await?;
        let mut note = format!(
            "{summary}\n\nClassification: {}",
            snapshot.text(fields::LABEL)
        );
        let rejection_type = snapshot.text(fields::REJECTION_TYPE);
        if !rejection_type.is_empty() {
            note.push_str(&format!("\nRejection Type: {rejection_type}"));
        }

        let document_url = match snapshot.text(fields::DOCUMENT_URL) {
            "" => None,
            url => Some(url.to_string()),
        };
        let status = self
            .messenger
            .send_review_request(ReviewRequest {
                note,
                draft: final_draft.to_string(),
                sender_email: snapshot.text(fields::SENDER_EMAIL).to_string(),
                subject: snapshot.text(fields::SUBJECT).to_string(),
                document_url,
            })
            .await?;
        Ok(StateUpdate::new().set_text(
            fields::NOTIFICATION_STATUS,
            format!("review request sent with status: {status}"),
        ))
    }
}

/// Creates the reply draft in the sender's mailbox thread.
pub struct CreateMailDraftStep {
    mailer: Arc<dyn MailDrafts>,
}

impl CreateMailDraftStep {
    pub fn new(mailer: Arc<dyn MailDrafts>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl Step for CreateMailDraftStep {
    async fn run(
        &self,
        snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        let to = require(&snapshot, fields::SENDER_EMAIL)?;
        let subject = require(&snapshot, fields::SUBJECT)?;
        let body = require(&snapshot, fields::FINAL_DRAFT)?;
        let status = self.mailer.create_draft(to, subject, body).await?;
        Ok(StateUpdate::new().set_text(fields::DRAFT_STATUS, status))
    }
}
