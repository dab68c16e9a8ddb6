//! Interval poll loop with a global single-flight guard and a
//! failure cooldown.
//!
//! One tick fetches the unread batch and hands it to the engine. Ticks
//! never overlap: a tick arriving while another runs is skipped. A
//! fetch failure invalidates the mailbox session and retries once with
//! a fresh token; a second failure puts the scheduler into a cooldown
//! during which ticks do nothing.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::auth::SessionManager;
use crate::clients::{InboundMessage, MailGateway};
use crate::engine::CorrelationEngine;
use crate::error::{Error, Result};

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Batch fetched and driven to completion.
    Completed { processed: usize },
    /// Another tick was already in flight.
    Skipped,
    /// Inside the failure cooldown window, or the tick that entered it.
    CoolingDown,
}

/// Poll scheduler. `tick()` is public so an operator-facing manual
/// trigger can share the interval loop's single-flight guard.
pub struct PollScheduler {
    engine: Arc<CorrelationEngine>,
    sessions: Arc<SessionManager>,
    mail: Arc<dyn MailGateway>,
    mailbox_identity: String,
    poll_interval: Duration,
    failure_cooldown: Duration,
    in_flight: AtomicBool,
    cooldown_until: std::sync::Mutex<Option<Instant>>,
}

impl PollScheduler {
    pub fn new(
        engine: Arc<CorrelationEngine>,
        sessions: Arc<SessionManager>,
        mail: Arc<dyn MailGateway>,
        mailbox_identity: String,
        poll_interval: Duration,
        failure_cooldown: Duration,
    ) -> Self {
        Self {
            engine,
            sessions,
            mail,
            mailbox_identity,
            poll_interval,
            failure_cooldown,
            in_flight: AtomicBool::new(false),
            cooldown_until: std::sync::Mutex::new(None),
        }
    }

    /// Run one poll cycle. No-op (`Skipped`) while another cycle is in
    /// flight, whether that cycle came from the interval loop or a
    /// manual trigger.
    pub async fn tick(&self) -> TickOutcome {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return TickOutcome::Skipped;
        }
        let outcome = self.run_cycle().await;
        self.in_flight.store(false, Ordering::SeqCst);
        outcome
    }

    async fn run_cycle(&self) -> TickOutcome {
        if self.cooling_down() {
            return TickOutcome::CoolingDown;
        }

        let batch = match self.fetch_batch().await {
            Ok(batch) => batch,
            Err(error) => {
                warn!(error = %error, "Batch fetch failed; refreshing mailbox session");
                self.sessions.invalidate(&self.mailbox_identity).await;
                match self.fetch_batch().await {
                    Ok(batch) => batch,
                    Err(retry_error) => {
                        warn!(
                            error = %retry_error,
                            cooldown_secs = self.failure_cooldown.as_secs(),
                            "Batch fetch failed after session refresh; entering cooldown"
                        );
                        *self.cooldown_until.lock().unwrap_or_else(|p| p.into_inner()) =
                            Some(Instant::now() + self.failure_cooldown);
                        return TickOutcome::CoolingDown;
                    }
                }
            }
        };

        let processed = self.engine.process_batch(batch).await;
        *self.cooldown_until.lock().unwrap_or_else(|p| p.into_inner()) = None;
        TickOutcome::Completed { processed }
    }

    fn cooling_down(&self) -> bool {
        self.cooldown_until
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some_and(|until| Instant::now() < until)
    }

    async fn fetch_batch(&self) -> Result<Vec<InboundMessage>> {
        let token = self.sessions.get_valid_token(&self.mailbox_identity).await?;
        self.mail.fetch_unread(&token).await.map_err(Error::from)
    }

    /// Spawn the interval loop. Returns the task handle and a shutdown
    /// flag; setting the flag stops the loop at the next interval.
    pub fn spawn(self: Arc<Self>) -> (JoinHandle<()>, Arc<AtomicBool>) {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                interval_secs = self.poll_interval.as_secs(),
                "Poll scheduler started"
            );

            loop {
                interval.tick().await;
                if flag.load(Ordering::SeqCst) {
                    info!("Poll scheduler stopping");
                    break;
                }
                match self.tick().await {
                    TickOutcome::Completed { processed } if processed > 0 => {
                        info!(processed, "Poll cycle completed");
                    }
                    TickOutcome::Completed { .. } => {}
                    TickOutcome::Skipped => info!("Poll cycle skipped; previous still running"),
                    TickOutcome::CoolingDown => {}
                }
            }
        });

        (handle, shutdown)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;

    use super::*;
    use crate::auth::{Authenticator, IssuedToken};
    use crate::clients::{
        Classification, Classifier, NotifyError, Notifier, TicketClient,
    };
    use crate::error::{
        AuthError, ClassifyError, MailError, StoreError, TicketError,
    };
    use crate::store::{ConversationRecord, ConversationStore};

    struct CountingAuthenticator {
        logins: AtomicUsize,
    }

    #[async_trait]
    impl Authenticator for CountingAuthenticator {
        async fn authenticate(&self, _identity: &str) -> Result<IssuedToken, AuthError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            Ok(IssuedToken {
                token: "tok".into(),
                ttl: Duration::from_secs(3600),
            })
        }
    }

    /// Fails the first `fail_first` fetches, then returns empty
    /// batches. Optional latency to hold a tick open.
    struct FlakyMail {
        fail_first: usize,
        fetches: AtomicUsize,
        latency: Duration,
    }

    impl FlakyMail {
        fn failing(fail_first: usize) -> Self {
            Self {
                fail_first,
                fetches: AtomicUsize::new(0),
                latency: Duration::ZERO,
            }
        }

        fn slow(latency: Duration) -> Self {
            Self {
                fail_first: 0,
                fetches: AtomicUsize::new(0),
                latency,
            }
        }
    }

    #[async_trait]
    impl MailGateway for FlakyMail {
        async fn fetch_unread(&self, _token: &str) -> Result<Vec<InboundMessage>, MailError> {
            let attempt = self.fetches.fetch_add(1, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if attempt < self.fail_first {
                return Err(MailError::Fetch("stubbed outage".into()));
            }
            Ok(Vec::new())
        }

        async fn mark_read(&self, _token: &str, _message_id: &str) -> Result<(), MailError> {
            Ok(())
        }

        async fn send(
            &self,
            _token: &str,
            _to: &str,
            _subject: &str,
            _html_body: &str,
        ) -> Result<(), MailError> {
            Ok(())
        }
    }

    struct EmptyStore;

    #[async_trait]
    impl ConversationStore for EmptyStore {
        async fn find(
            &self,
            _conversation_id: &str,
        ) -> Result<Option<ConversationRecord>, StoreError> {
            Ok(None)
        }

        async fn create(
            &self,
            _conversation_id: &str,
            _case_id: &str,
            _requester: &str,
            _subject: &str,
        ) -> Result<ConversationRecord, StoreError> {
            Err(StoreError::Query("unused in scheduler tests".into()))
        }

        async fn clear_all(&self) -> Result<(), StoreError> {
            Ok(())
        }

        async fn count(&self) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    struct UnusedClassifier;

    #[async_trait]
    impl Classifier for UnusedClassifier {
        async fn classify(
            &self,
            _body: &str,
            _subject: &str,
        ) -> Result<Classification, ClassifyError> {
            Err(ClassifyError::RequestFailed("unused".into()))
        }
    }

    struct UnusedTickets;

    #[async_trait]
    impl TicketClient for UnusedTickets {
        async fn create_draft(
            &self,
            _fields: &Classification,
            _requester: &str,
            _token: &str,
        ) -> Result<String, TicketError> {
            Err(TicketError::CreateFailed("unused".into()))
        }

        async fn submit(&self, case_id: &str, _token: &str) -> Result<(), TicketError> {
            Err(TicketError::SubmitFailed {
                case_id: case_id.to_string(),
                reason: "unused".into(),
            })
        }

        async fn comment(
            &self,
            case_id: &str,
            _text: &str,
            _token: &str,
        ) -> Result<(), TicketError> {
            Err(TicketError::CommentFailed {
                case_id: case_id.to_string(),
                reason: "unused".into(),
            })
        }

        async fn submit_questionnaire(
            &self,
            case_id: &str,
            _answers: &std::collections::BTreeMap<u32, String>,
            _token: &str,
        ) -> Result<(), TicketError> {
            Err(TicketError::QuestionnaireFailed {
                case_id: case_id.to_string(),
                reason: "unused".into(),
            })
        }
    }

    struct SilentNotifier;

    #[async_trait]
    impl Notifier for SilentNotifier {
        async fn notify(&self, _case_id: &str, _message: &str) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    struct Fixture {
        scheduler: Arc<PollScheduler>,
        mail: Arc<FlakyMail>,
        authenticator: Arc<CountingAuthenticator>,
    }

    fn fixture(mail: FlakyMail, cooldown: Duration) -> Fixture {
        fixture_with_interval(mail, cooldown, Duration::from_secs(30))
    }

    fn fixture_with_interval(
        mail: FlakyMail,
        cooldown: Duration,
        poll_interval: Duration,
    ) -> Fixture {
        let mail = Arc::new(mail);
        let authenticator = Arc::new(CountingAuthenticator {
            logins: AtomicUsize::new(0),
        });
        let sessions = Arc::new(SessionManager::new(authenticator.clone()));
        let engine = Arc::new(CorrelationEngine::new(
            Arc::new(EmptyStore),
            sessions.clone(),
            Arc::new(UnusedClassifier),
            Arc::new(UnusedTickets),
            Arc::new(SilentNotifier),
            mail.clone(),
            "bot@x.com".into(),
        ));
        let scheduler = Arc::new(PollScheduler::new(
            engine,
            sessions,
            mail.clone(),
            "bot@x.com".into(),
            poll_interval,
            cooldown,
        ));
        Fixture {
            scheduler,
            mail,
            authenticator,
        }
    }

    #[tokio::test]
    async fn empty_batch_completes_with_zero_processed() {
        let f = fixture(FlakyMail::failing(0), Duration::from_secs(60));
        assert_eq!(
            f.scheduler.tick().await,
            TickOutcome::Completed { processed: 0 }
        );
    }

    #[tokio::test]
    async fn concurrent_tick_is_skipped() {
        let f = fixture(
            FlakyMail::slow(Duration::from_millis(100)),
            Duration::from_secs(60),
        );

        let first = {
            let scheduler = Arc::clone(&f.scheduler);
            tokio::spawn(async move { scheduler.tick().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(f.scheduler.tick().await, TickOutcome::Skipped);
        assert_eq!(
            first.await.unwrap(),
            TickOutcome::Completed { processed: 0 }
        );
    }

    #[tokio::test]
    async fn fetch_failure_refreshes_session_and_retries_once() {
        let f = fixture(FlakyMail::failing(1), Duration::from_secs(60));

        let outcome = f.scheduler.tick().await;

        assert_eq!(outcome, TickOutcome::Completed { processed: 0 });
        assert_eq!(f.mail.fetches.load(Ordering::SeqCst), 2);
        // Initial login plus the forced re-login after invalidation.
        assert_eq!(f.authenticator.logins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_fetch_failure_enters_cooldown() {
        let f = fixture(FlakyMail::failing(2), Duration::from_secs(60));

        assert_eq!(f.scheduler.tick().await, TickOutcome::CoolingDown);
        assert_eq!(f.mail.fetches.load(Ordering::SeqCst), 2);

        // Ticks inside the window do not touch the mailbox.
        assert_eq!(f.scheduler.tick().await, TickOutcome::CoolingDown);
        assert_eq!(f.mail.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_cooldown_allows_the_next_tick() {
        let f = fixture(FlakyMail::failing(2), Duration::ZERO);

        assert_eq!(f.scheduler.tick().await, TickOutcome::CoolingDown);
        assert_eq!(
            f.scheduler.tick().await,
            TickOutcome::Completed { processed: 0 }
        );
    }

    #[tokio::test]
    async fn shutdown_flag_stops_the_loop() {
        let f = fixture_with_interval(
            FlakyMail::failing(0),
            Duration::from_secs(60),
            Duration::from_millis(10),
        );
        let scheduler = Arc::clone(&f.scheduler);

        let (handle, shutdown) = scheduler.spawn();
        shutdown.store(true, Ordering::SeqCst);

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
