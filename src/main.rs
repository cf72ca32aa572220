mod alert;
mod config;
mod dtos;
mod feed;
mod models;
mod remote;
mod service;
mod utils;

use std::sync::Arc;

use config::Config;
use dotenv::dotenv;
use tokio::time::Duration;
use tracing_subscriber::filter::LevelFilter;
use uuid::Uuid;

use crate::alert::{AlertSink, LogAlertSink};
use crate::dtos::chatdtos::{SendMessageDto, SessionQuery};
use crate::feed::ChangeFeed;
use crate::models::agentmodel::AgentProfile;
use crate::models::chatmodels::{SessionPriority, SessionStatus};
use crate::remote::memorydb::MemoryBackend;
use crate::remote::supportapi::SupportApi;
use crate::service::directory_service::SessionDirectory;
use crate::service::notification_service::NotificationDispatcher;
use crate::service::stream_service::MessageStream;

#[derive(Clone)]
pub struct AppState {
    pub env: Config,
    pub feed: Arc<ChangeFeed>,
    pub remote: Arc<dyn SupportApi>,
    // Services
    pub session_directory: Arc<SessionDirectory>,
    pub message_stream: Arc<MessageStream>,
    pub notification_dispatcher: Arc<NotificationDispatcher>,
}

impl AppState {
    pub fn new(
        remote: Arc<dyn SupportApi>,
        feed: Arc<ChangeFeed>,
        agent: AgentProfile,
        sink: Arc<dyn AlertSink>,
        config: Config,
    ) -> Self {
        let session_directory = Arc::new(SessionDirectory::new(
            remote.clone(),
            feed.clone(),
            agent,
            Duration::from_secs(config.directory_refresh_secs),
        ));
        let message_stream = Arc::new(MessageStream::new(
            remote.clone(),
            feed.clone(),
            session_directory.clone(),
            Duration::from_secs(config.message_refresh_secs),
        ));
        let notification_dispatcher = Arc::new(NotificationDispatcher::new(
            feed.clone(),
            sink,
            config.preview_chars,
        ));

        Self {
            env: config,
            feed,
            remote,
            session_directory,
            message_stream,
            notification_dispatcher,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::INFO)
        .init();

    dotenv().ok();

    let config = Config::init();

    let feed = Arc::new(ChangeFeed::new(config.feed_capacity));
    let backend = Arc::new(MemoryBackend::new(feed.clone()));
    let agent = AgentProfile::new(Uuid::new_v4(), "Demo Agent");

    let app_state = AppState::new(
        backend.clone(),
        feed.clone(),
        agent,
        Arc::new(LogAlertSink),
        config,
    );

    // One Ctrl+C-driven signal, fanned out to every sync loop.
    let (shutdown_tx, _) = tokio::sync::broadcast::channel::<()>(1);
    let shutdown = |mut rx: tokio::sync::broadcast::Receiver<()>| async move {
        let _ = rx.recv().await;
    };

    let directory_loop = tokio::spawn(
        app_state
            .session_directory
            .clone()
            .run_forever(shutdown(shutdown_tx.subscribe())),
    );
    let stream_loop = tokio::spawn(
        app_state
            .message_stream
            .clone()
            .run_forever(shutdown(shutdown_tx.subscribe())),
    );
    let dispatcher_loop = tokio::spawn(
        app_state
            .notification_dispatcher
            .clone()
            .run_forever(shutdown(shutdown_tx.subscribe())),
    );

    // Simulated customer traffic so the loops have something to chew on.
    let simulator_backend = backend.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(5));
        let mut round: u64 = 0;
        let mut sessions = Vec::new();

        loop {
            tick.tick().await;
            round += 1;

            match round % 4 {
                0 => {
                    let session = simulator_backend.create_waiting_session(
                        &format!("Customer {}", round),
                        SessionPriority::Urgent,
                        Some("Water leak in the kitchen"),
                    );
                    sessions.push(session.id);
                }
                1 => {
                    let session = simulator_backend.create_waiting_session(
                        &format!("Customer {}", round),
                        SessionPriority::Medium,
                        Some("Question about my lease"),
                    );
                    sessions.push(session.id);
                }
                2 => {
                    if let Some(session_id) = sessions.last().copied() {
                        let _ = simulator_backend
                            .escalate_session(session_id, SessionPriority::Urgent);
                    }
                }
                _ => {
                    if let Some(session_id) = sessions.last().copied() {
                        let _ = simulator_backend
                            .customer_message(session_id, "Hello, anyone there?");
                    }
                }
            }
        }
    });

    // The demo agent claims the busiest waiting session and greets.
    let directory = app_state.session_directory.clone();
    let stream = app_state.message_stream.clone();
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(15));
        loop {
            tick.tick().await;

            let listed = directory.list_sessions(&SessionQuery::default()).await;
            tracing::info!("{} sessions waiting in the queue", directory.waiting_count().await);
            let Some(session) = listed.iter().find(|s| s.status == SessionStatus::Waiting) else {
                continue;
            };

            if let Err(e) = directory.assign(session.id).await {
                tracing::warn!("Demo assign failed: {}", e);
                continue;
            }
            stream.open(session.id).await;
            if let Err(e) = stream
                .send(session.id, SendMessageDto::new("Hi, how can I help?"))
                .await
            {
                tracing::warn!("Demo greeting failed: {}", e);
            }
        }
    });

    tracing::info!("nestdesk sync layer running, Ctrl+C to stop");
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }

    tracing::info!("Shutting down");
    let _ = shutdown_tx.send(());
    let _ = directory_loop.await;
    let _ = stream_loop.await;
    let _ = dispatcher_loop.await;
}
