//! Remote collaborators, each behind a narrow trait: the mailbox, the
//! classifier, the ticket backend, and the notification sink.

pub mod classifier;
pub mod mail;
pub mod slack;
pub mod ticket;

pub use classifier::{Classification, Classifier, ClaudeClassifier, FallbackClassifier};
pub use mail::{GraphMailClient, InboundMessage, MailGateway};
pub use slack::{NoopNotifier, Notifier, NotifyError, SlackNotifier};
pub use ticket::{HttpTicketClient, TicketClient, TicketEndpoints};
