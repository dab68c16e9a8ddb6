use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use maildesk::auth::{
    Authenticator, CredentialStore, DeviceCodeAuthenticator, DeviceCodeConfig,
    PasswordAuthenticator, SessionManager,
};
use maildesk::clients::{
    ClaudeClassifier, Classifier, FallbackClassifier, GraphMailClient, HttpTicketClient,
    NoopNotifier, Notifier, SlackNotifier, TicketEndpoints,
};
use maildesk::config::{AuthMode, BotConfig};
use maildesk::engine::CorrelationEngine;
use maildesk::scheduler::PollScheduler;
use maildesk::store::{ConversationStore, LibSqlStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  See README for the MAILDESK_* environment variables.");
        std::process::exit(1);
    });

    let credentials = std::env::var("MAILDESK_CREDENTIALS")
        .ok()
        .map(|raw| CredentialStore::from_env_string(&raw))
        .transpose()
        .unwrap_or_else(|e| {
            eprintln!("Error: {e}");
            std::process::exit(1);
        })
        .unwrap_or_else(CredentialStore::new);

    eprintln!("maildesk v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Mailbox: {}", config.mailbox_identity);
    eprintln!("   Poll interval: {}s", config.poll_interval.as_secs());
    eprintln!("   Credentials loaded: {}", credentials.len());

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()?;

    let authenticator: Arc<dyn Authenticator> = match config.auth_mode {
        AuthMode::Password => Arc::new(PasswordAuthenticator::new(
            http.clone(),
            Arc::new(credentials),
            config.auth_url.clone(),
            config.token_ttl,
        )),
        AuthMode::DeviceCode => {
            let device = DeviceCodeConfig::from_env().unwrap_or_else(|e| {
                eprintln!("Error: {e}");
                std::process::exit(1);
            });
            Arc::new(DeviceCodeAuthenticator::new(http.clone(), device))
        }
    };
    let sessions = Arc::new(SessionManager::new(authenticator));

    let db_path =
        std::env::var("MAILDESK_DB_PATH").unwrap_or_else(|_| "./data/maildesk.db".to_string());
    let store: Arc<dyn ConversationStore> = Arc::new(
        LibSqlStore::open(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {db_path}");
    eprintln!(
        "   Tracked conversations: {}",
        store.count().await.unwrap_or(0)
    );

    let classifier: Arc<dyn Classifier> = match config.classifier_api_key.clone() {
        Some(key) => Arc::new(ClaudeClassifier::new(
            http.clone(),
            key,
            config.classifier_model.clone(),
        )),
        None => {
            eprintln!("   Classifier: disabled (fallback fields only)");
            Arc::new(FallbackClassifier)
        }
    };

    let tickets = Arc::new(HttpTicketClient::new(
        http.clone(),
        TicketEndpoints {
            create_url: config.ticket_create_url.clone(),
            submit_url: config.ticket_submit_url.clone(),
            comment_url: config.ticket_comment_url.clone(),
            questionnaire_url: config.questionnaire_submit_url.clone(),
        },
    ));

    let notifier: Arc<dyn Notifier> = match config.slack_token.clone() {
        Some(token) => Arc::new(SlackNotifier::new(
            http.clone(),
            token,
            config.slack_channel.clone(),
        )),
        None => {
            eprintln!("   Notifications: disabled (no Slack token)");
            Arc::new(NoopNotifier)
        }
    };

    let mail = Arc::new(GraphMailClient::new(http, config.mail_api_base.clone()));

    let engine = Arc::new(CorrelationEngine::new(
        store,
        sessions.clone(),
        classifier,
        tickets,
        notifier,
        mail.clone(),
        config.mailbox_identity.clone(),
    ));

    let scheduler = Arc::new(PollScheduler::new(
        engine,
        sessions,
        mail,
        config.mailbox_identity.clone(),
        config.poll_interval,
        config.failure_cooldown,
    ));
    let (handle, shutdown) = Arc::clone(&scheduler).spawn();

    tokio::signal::ctrl_c().await?;
    eprintln!("Shutting down");
    shutdown.store(true, Ordering::SeqCst);

    // Let the loop observe the flag at its next interval tick.
    let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;

    Ok(())
}
