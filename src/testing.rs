//! Shared testing utilities.
//!
//! Common mock steps, routers, and collaborators used across test modules,
//! kept in one place for consistency.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::pipeline::collaborators::{
    CollaboratorError, ContinuationDecision, DocumentExtraction, DocumentVault, LanguageModel,
    MailDrafts, Messenger, RejectionStrategy, ReviewRequest, ThreadArchive,
};
use crate::pipeline::Collaborators;
use crate::state::{StateSnapshot, StateUpdate};
use crate::step::{Router, Step, StepContext, StepError};
use crate::utils::rng::DeterministicRng;

/// Shared record of which steps ran, in order.
#[derive(Clone, Default)]
pub struct InvocationLog {
    inner: Arc<Mutex<Vec<String>>>,
}

impl InvocationLog {
    pub fn push(&self, name: &str) {
        self.inner.lock().unwrap().push(name.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.inner.lock().unwrap().clone()
    }
}

/// Minimal step that writes its own name into the `trace` field.
#[derive(Clone, Debug)]
pub struct MarkerStep {
    pub name: &'static str,
}

#[async_trait]
impl Step for MarkerStep {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        Ok(StateUpdate::new().set_text("trace", self.name))
    }
}

/// Step that records its invocation in an [`InvocationLog`] and writes its
/// name into the `trace` field.
pub struct RecordingStep {
    name: &'static str,
    log: InvocationLog,
}

impl RecordingStep {
    pub fn new(name: &'static str, log: &InvocationLog) -> Self {
        Self {
            name,
            log: log.clone(),
        }
    }
}

#[async_trait]
impl Step for RecordingStep {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        self.log.push(self.name);
        Ok(StateUpdate::new().set_text("trace", self.name))
    }
}

/// Step that always fails with a missing-input error.
#[derive(Clone, Debug)]
pub struct FailingStep {
    what: &'static str,
}

impl FailingStep {
    pub fn new(what: &'static str) -> Self {
        Self { what }
    }
}

#[async_trait]
impl Step for FailingStep {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        Err(StepError::MissingInput { what: self.what })
    }
}

/// Step that writes one arbitrary field, declared or not.
#[derive(Clone, Debug)]
pub struct WritingStep {
    field: &'static str,
    value: &'static str,
}

impl WritingStep {
    pub fn new(field: &'static str, value: &'static str) -> Self {
        Self { field, value }
    }
}

#[async_trait]
impl Step for WritingStep {
    async fn run(
        &self,
        _snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<StateUpdate, StepError> {
        Ok(StateUpdate::new().set_text(self.field, self.value))
    }
}

/// Router that always produces the same outcome.
pub struct FixedRouter {
    outcome: &'static str,
    declared: &'static [&'static str],
}

impl FixedRouter {
    pub fn new(outcome: &'static str, declared: &'static [&'static str]) -> Self {
        Self { outcome, declared }
    }
}

#[async_trait]
impl Router for FixedRouter {
    fn outcomes(&self) -> &[&'static str] {
        self.declared
    }

    async fn route(
        &self,
        _snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<String, StepError> {
        Ok(self.outcome.to_string())
    }
}

/// Router that picks among its declared outcomes with a seeded RNG, for
/// fuzzing traversal over random topologies.
pub struct SeededRouter {
    declared: &'static [&'static str],
    rng: Mutex<DeterministicRng>,
}

impl SeededRouter {
    pub fn new(seed: u64, declared: &'static [&'static str]) -> Self {
        Self {
            declared,
            rng: Mutex::new(DeterministicRng::new(seed)),
        }
    }
}

#[async_trait]
impl Router for SeededRouter {
    fn outcomes(&self) -> &[&'static str] {
        self.declared
    }

    async fn route(
        &self,
        _snapshot: StateSnapshot,
        _ctx: StepContext,
    ) -> Result<String, StepError> {
        let mut rng = self.rng.lock().unwrap();
        let outcome = rng.choose(self.declared).copied().unwrap_or("");
        Ok(outcome.to_string())
    }
}

/// Scripted language model returning canned answers.
#[derive(Debug)]
pub struct ScriptedModel {
    label: String,
    decision: ContinuationDecision,
    query: String,
    rejection_type: String,
    challenge_angles: Vec<String>,
    soft_rejection_draft: String,
    draft: String,
    final_draft: String,
    summary: String,
    fail_on_vector_query: bool,
    last_document_context: Mutex<Option<String>>,
}

impl Default for ScriptedModel {
    fn default() -> Self {
        Self {
            label: "Accepted".into(),
            decision: ContinuationDecision::Continue,
            query: "query".into(),
            rejection_type: "Hard Rejection".into(),
            challenge_angles: Vec::new(),
            soft_rejection_draft: "soft draft".into(),
            draft: "draft".into(),
            final_draft: "final draft".into(),
            summary: "summary".into(),
            fail_on_vector_query: false,
            last_document_context: Mutex::new(None),
        }
    }
}

impl ScriptedModel {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_decision(mut self, decision: ContinuationDecision) -> Self {
        self.decision = decision;
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_rejection_type(mut self, rejection_type: impl Into<String>) -> Self {
        self.rejection_type = rejection_type.into();
        self
    }

    pub fn with_challenge_angles<I, S>(mut self, angles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.challenge_angles = angles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_soft_rejection_draft(mut self, draft: impl Into<String>) -> Self {
        self.soft_rejection_draft = draft.into();
        self
    }

    pub fn with_draft(mut self, draft: impl Into<String>) -> Self {
        self.draft = draft.into();
        self
    }

    pub fn with_final_draft(mut self, final_draft: impl Into<String>) -> Self {
        self.final_draft = final_draft.into();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn failing_on_vector_query(mut self) -> Self {
        self.fail_on_vector_query = true;
        self
    }

    pub fn last_document_context(&self) -> Option<String> {
        self.last_document_context.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn classify(&self, _email_text: &str) -> Result<String, CollaboratorError> {
        Ok(self.label.clone())
    }

    async fn continuation_decision(
        &self,
        _email_text: &str,
    ) -> Result<ContinuationDecision, CollaboratorError> {
        Ok(self.decision)
    }

    async fn vector_query(&self, _email_text: &str) -> Result<String, CollaboratorError> {
        if self.fail_on_vector_query {
            return Err(CollaboratorError::Unavailable {
                service: "language model",
                message: "scripted failure".into(),
            });
        }
        Ok(self.query.clone())
    }

    async fn rejection_strategy(
        &self,
        _email_text: &str,
        _label: &str,
    ) -> Result<RejectionStrategy, CollaboratorError> {
        Ok(RejectionStrategy {
            rejection_type: self.rejection_type.clone(),
            challenge_angles: self.challenge_angles.clone(),
        })
    }

    async fn soft_rejection_draft(
        &self,
        _email_text: &str,
        _label: &str,
        _challenge_angles: &[String],
    ) -> Result<String, CollaboratorError> {
        Ok(self.soft_rejection_draft.clone())
    }

    async fn draft_reply(
        &self,
        _email_text: &str,
        _example_threads: &[String],
        document_context: Option<&str>,
    ) -> Result<String, CollaboratorError> {
        *self.last_document_context.lock().unwrap() = document_context.map(str::to_string);
        Ok(self.draft.clone())
    }

    async fn edit_draft(
        &self,
        _email_text: &str,
        _draft: &str,
    ) -> Result<String, CollaboratorError> {
        Ok(self.final_draft.clone())
    }

    async fn notification_summary(&self, _email_text: &str) -> Result<String, CollaboratorError> {
        Ok(self.summary.clone())
    }
}

/// Archive returning a fixed thread list, truncated to `top_k`.
pub struct StaticArchive {
    threads: Vec<String>,
}

impl StaticArchive {
    pub fn new<I, S>(threads: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            threads: threads.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ThreadArchive for StaticArchive {
    async fn fetch_threads(
        &self,
        _query: &str,
        top_k: usize,
    ) -> Result<Vec<String>, CollaboratorError> {
        Ok(self.threads.iter().take(top_k).cloned().collect())
    }
}

/// Vault returning a fixed extraction result.
pub struct StaticVault {
    extraction: DocumentExtraction,
}

impl StaticVault {
    pub fn new(extraction: DocumentExtraction) -> Self {
        Self { extraction }
    }
}

#[async_trait]
impl DocumentVault for StaticVault {
    async fn extract_client_documents(
        &self,
        _email_text: &str,
    ) -> Result<DocumentExtraction, CollaboratorError> {
        Ok(self.extraction.clone())
    }
}

/// Messenger recording the last review request.
#[derive(Default)]
pub struct RecordingMessenger {
    last: Mutex<Option<ReviewRequest>>,
}

impl RecordingMessenger {
    pub fn last_request(&self) -> Option<ReviewRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send_review_request(
        &self,
        request: ReviewRequest,
    ) -> Result<String, CollaboratorError> {
        *self.last.lock().unwrap() = Some(request);
        Ok("200".to_string())
    }
}

/// Mailer recording the last draft recipient.
#[derive(Default)]
pub struct RecordingMailer {
    last_to: Mutex<Option<String>>,
}

impl RecordingMailer {
    pub fn last_to(&self) -> Option<String> {
        self.last_to.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailDrafts for RecordingMailer {
    async fn create_draft(
        &self,
        to: &str,
        _subject: &str,
        _body: &str,
    ) -> Result<String, CollaboratorError> {
        *self.last_to.lock().unwrap() = Some(to.to_string());
        Ok("draft created".to_string())
    }
}

/// Assemble a full collaborator set around a scripted model.
pub fn test_collaborators(model: ScriptedModel) -> Collaborators {
    Collaborators {
        model: Arc::new(model),
        archive: Arc::new(StaticArchive::new(["example thread"])),
        vault: Arc::new(StaticVault::new(DocumentExtraction {
            status: "Success".into(),
            content: None,
            folder_url: None,
        })),
        messenger: Arc::new(RecordingMessenger::default()),
        mailer: Arc::new(RecordingMailer::default()),
    }
}
