//! Error types for maildesk.

/// Top-level error type for the bot.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Mail gateway error: {0}")]
    Mail(#[from] MailError),

    #[error("Classification error: {0}")]
    Classify(#[from] ClassifyError),

    #[error("Ticket error: {0}")]
    Ticket(#[from] TicketError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Malformed credential entry: {0}")]
    MalformedCredential(String),
}

/// Authentication and session errors.
///
/// `NoCredential` is permanent for an identity until configuration changes.
/// `RemoteRejected` and `Declined` are terminal for the attempt.
/// `NetworkUnavailable` and `Timeout` are transient.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("No credentials registered for identity {identity}")]
    NoCredential { identity: String },

    #[error("Login rejected by remote: {reason}")]
    RemoteRejected { reason: String },

    #[error("Authentication endpoint unreachable: {reason}")]
    NetworkUnavailable { reason: String },

    #[error("Authentication request timed out")]
    Timeout,

    #[error("User declined the device-code authentication request")]
    Declined,

    #[error("Device code expired before authentication completed")]
    CodeExpired,
}

/// Conversation store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Conversation {conversation_id} already mapped to case {existing_case_id}")]
    Conflict {
        conversation_id: String,
        existing_case_id: String,
    },
}

/// Mail gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Mailbox fetch failed: {0}")]
    Fetch(String),

    #[error("Failed to mark message {message_id} read: {reason}")]
    MarkRead { message_id: String, reason: String },

    #[error("Failed to send mail to {to}: {reason}")]
    Send { to: String, reason: String },
}

/// Classifier errors. Always recoverable: the engine substitutes
/// fallback fields and continues.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("Classifier request failed: {0}")]
    RequestFailed(String),

    #[error("Unparsable classifier output: {0}")]
    InvalidResponse(String),
}

/// Ticket backend errors. Fatal for the current message only.
#[derive(Debug, thiserror::Error)]
pub enum TicketError {
    #[error("Draft creation failed: {0}")]
    CreateFailed(String),

    #[error("Submission of case {case_id} failed: {reason}")]
    SubmitFailed { case_id: String, reason: String },

    #[error("Comment on case {case_id} failed: {reason}")]
    CommentFailed { case_id: String, reason: String },

    #[error("Questionnaire submission for case {case_id} failed: {reason}")]
    QuestionnaireFailed { case_id: String, reason: String },
}

/// Pre-flight validation errors, raised before any remote call.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Questionnaire response for case {case_id} has no non-empty answers")]
    EmptyAnswers { case_id: String },
}

/// Result type alias for the bot. The error parameter defaults to the
/// top-level `Error` but can name a domain enum directly.
pub type Result<T, E = Error> = std::result::Result<T, E>;
