//! Per-message correlation state machine and concurrent batch driver.
//!
//! Every inbound message resolves to exactly one disposition: a new
//! case, a comment on an existing case, or a questionnaire submission.
//! The conversation id is the correlation key; the store decides which
//! branch runs.

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::auth::SessionManager;
use crate::clients::{
    Classification, Classifier, InboundMessage, MailGateway, Notifier, TicketClient,
};
use crate::engine::content;
use crate::error::{Error, Result, ValidationError};
use crate::store::ConversationStore;

/// Outcome of one message's workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// First message of a conversation: a case was created and the
    /// mapping persisted.
    CaseCreated { case_id: String },
    /// Follow-up on a known conversation, posted as a comment.
    CommentAdded { case_id: String },
    /// Follow-up recognized as questionnaire answers and submitted.
    QuestionnaireSubmitted { case_id: String, answers: usize },
}

impl Disposition {
    pub fn case_id(&self) -> &str {
        match self {
            Self::CaseCreated { case_id }
            | Self::CommentAdded { case_id }
            | Self::QuestionnaireSubmitted { case_id, .. } => case_id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::CaseCreated { .. } => "case-created",
            Self::CommentAdded { .. } => "comment-added",
            Self::QuestionnaireSubmitted { .. } => "questionnaire-submitted",
        }
    }
}

/// Correlation engine: owns the branch decision and the strict
/// in-message call ordering. All collaborators are injected.
pub struct CorrelationEngine {
    store: Arc<dyn ConversationStore>,
    sessions: Arc<SessionManager>,
    classifier: Arc<dyn Classifier>,
    tickets: Arc<dyn TicketClient>,
    notifier: Arc<dyn Notifier>,
    mail: Arc<dyn MailGateway>,
    /// Identity whose session authorizes mailbox operations
    /// (mark-read), as opposed to the per-requester ticket sessions.
    mailbox_identity: String,
}

impl CorrelationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ConversationStore>,
        sessions: Arc<SessionManager>,
        classifier: Arc<dyn Classifier>,
        tickets: Arc<dyn TicketClient>,
        notifier: Arc<dyn Notifier>,
        mail: Arc<dyn MailGateway>,
        mailbox_identity: String,
    ) -> Self {
        Self {
            store,
            sessions,
            classifier,
            tickets,
            notifier,
            mail,
            mailbox_identity,
        }
    }

    /// Run the full workflow for one message. Errors are terminal for
    /// this message only; the caller decides whether to retry.
    pub async fn process(&self, message: &InboundMessage) -> Result<Disposition> {
        match self.store.find(&message.conversation_id).await? {
            Some(record) => self.handle_follow_up(message, &record.case_id).await,
            None => self.handle_new_case(message).await,
        }
    }

    /// Drive a batch concurrently, isolating failures per message.
    /// A message is marked read only after its workflow succeeds, so
    /// failed messages are re-fetched on the next tick. Returns the
    /// number of successfully processed messages.
    pub async fn process_batch(self: &Arc<Self>, messages: Vec<InboundMessage>) -> usize {
        let mut tasks = JoinSet::new();
        for message in messages {
            let engine = Arc::clone(self);
            tasks.spawn(async move { engine.process_one(message).await });
        }

        let mut processed = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(true) => processed += 1,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "Message task aborted"),
            }
        }
        processed
    }

    async fn process_one(&self, message: InboundMessage) -> bool {
        match self.process(&message).await {
            Ok(disposition) => {
                info!(
                    message_id = %message.id,
                    conversation_id = %message.conversation_id,
                    case_id = %disposition.case_id(),
                    disposition = disposition.label(),
                    "Message processed"
                );
                self.mark_consumed(&message).await;
                true
            }
            Err(error) => {
                warn!(
                    message_id = %message.id,
                    conversation_id = %message.conversation_id,
                    identity = %message.sender,
                    error = %error,
                    "Message workflow failed; left unread for retry"
                );
                false
            }
        }
    }

    /// New-case pipeline: classify (fallback on failure), authenticate
    /// as the requester, create + submit the case, persist the
    /// mapping, notify.
    async fn handle_new_case(&self, message: &InboundMessage) -> Result<Disposition> {
        let fields = match self.classifier.classify(&message.body, &message.subject).await {
            Ok(fields) => fields,
            Err(error) => {
                warn!(
                    conversation_id = %message.conversation_id,
                    error = %error,
                    "Classification failed; using fallback fields"
                );
                Classification::fallback(&message.subject)
            }
        };

        let token = self.sessions.get_valid_token(&message.sender).await?;

        let case_id = self.tickets.create_draft(&fields, &message.sender, &token).await?;

        if let Err(error) = self.tickets.submit(&case_id, &token).await {
            warn!(
                case_id = %case_id,
                error = %error,
                "Case created but submission failed; case remains in draft"
            );
        }

        self.store
            .create(
                &message.conversation_id,
                &case_id,
                &message.sender,
                &message.subject,
            )
            .await?;

        self.notify_best_effort(
            &case_id,
            &format!("New case created for {}: {}", message.sender, fields.subject),
        )
        .await;

        Ok(Disposition::CaseCreated { case_id })
    }

    /// Follow-up pipeline: questionnaire answers when the body carries
    /// answer markers, otherwise a stripped-content comment.
    async fn handle_follow_up(
        &self,
        message: &InboundMessage,
        case_id: &str,
    ) -> Result<Disposition> {
        if content::is_questionnaire_response(&message.body) {
            let answers = content::parse_numbered_answers(&message.body);
            if answers.is_empty() {
                return Err(Error::Validation(ValidationError::EmptyAnswers {
                    case_id: case_id.to_string(),
                }));
            }

            let token = self.sessions.get_valid_token(&message.sender).await?;
            self.tickets
                .submit_questionnaire(case_id, &answers, &token)
                .await?;

            self.notify_best_effort(
                case_id,
                &format!("Questionnaire answers received from {}", message.sender),
            )
            .await;

            return Ok(Disposition::QuestionnaireSubmitted {
                case_id: case_id.to_string(),
                answers: answers.len(),
            });
        }

        let comment = content::extract_new_content(&message.body);
        let token = self.sessions.get_valid_token(&message.sender).await?;
        self.tickets.comment(case_id, &comment, &token).await?;

        self.notify_best_effort(
            case_id,
            &format!("Follow-up received from {}", message.sender),
        )
        .await;

        Ok(Disposition::CommentAdded {
            case_id: case_id.to_string(),
        })
    }

    async fn notify_best_effort(&self, case_id: &str, text: &str) {
        if let Err(error) = self.notifier.notify(case_id, text).await {
            warn!(case_id = %case_id, error = %error, "Notification failed");
        }
    }

    async fn mark_consumed(&self, message: &InboundMessage) {
        let token = match self.sessions.get_valid_token(&self.mailbox_identity).await {
            Ok(token) => token,
            Err(error) => {
                warn!(
                    message_id = %message.id,
                    error = %error,
                    "No mailbox session; message stays unread"
                );
                return;
            }
        };
        if let Err(error) = self.mail.mark_read(&token, &message.id).await {
            warn!(message_id = %message.id, error = %error, "Mark-read failed");
        }
    }
}
