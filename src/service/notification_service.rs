// service/notification_service.rs
use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::alert::{AlertSink, AlertTone, NotificationPermission, OsNotification, Toast};
use crate::feed::{ChangeFeed, ChangeKind, FeedEvent};
use crate::models::chatmodels::{ChatMessage, ChatSession, SenderType, SessionPriority};
use crate::utils::text::truncate_preview;

struct DispatcherState {
    /// Resolved once, on first activation; a denial is permanent.
    permission: Option<NotificationPermission>,
    /// Last observed priority per session, for edge-triggered urgency.
    priorities: HashMap<Uuid, SessionPriority>,
}

/// Translates change-feed events into sounds, toasts and OS notifications,
/// independent of which panel is on screen. Purely a convenience layer: it
/// owns no business state and its alerts never feed back into the caches.
pub struct NotificationDispatcher {
    feed: Arc<ChangeFeed>,
    sink: Arc<dyn AlertSink>,
    preview_chars: usize,
    state: Mutex<DispatcherState>,
}

impl NotificationDispatcher {
    pub fn new(feed: Arc<ChangeFeed>, sink: Arc<dyn AlertSink>, preview_chars: usize) -> Self {
        Self {
            feed,
            sink,
            preview_chars,
            state: Mutex::new(DispatcherState {
                permission: None,
                priorities: HashMap::new(),
            }),
        }
    }

    async fn ensure_permission(&self) -> NotificationPermission {
        {
            let state = self.state.lock().await;
            if let Some(permission) = state.permission {
                return permission;
            }
        }

        let permission = self.sink.request_permission().await;
        self.state.lock().await.permission = Some(permission);
        permission
    }

    /// Playback failures (autoplay blocked, no interaction yet) are
    /// swallowed; alerting must never become an error source.
    async fn play(&self, tone: AlertTone) {
        if let Err(e) = self.sink.play_sound(tone).await {
            tracing::debug!("Alert sound suppressed: {}", e);
        }
    }

    async fn os_notify(&self, title: String, body: String, require_interaction: bool) {
        if self.ensure_permission().await == NotificationPermission::Denied {
            // Toasts and sounds remain the fallback channel.
            return;
        }
        self.sink
            .push_os_notification(OsNotification {
                title,
                body,
                require_interaction,
            })
            .await;
    }

    async fn urgent_session_alert(&self, session: &ChatSession) {
        let title = format!("Urgent chat from {}", session.customer_name);
        let body = session
            .subject
            .clone()
            .unwrap_or_else(|| "New urgent support session".into());

        self.play(AlertTone::Urgent).await;
        self.sink
            .show_toast(Toast {
                title: title.clone(),
                body: body.clone(),
                sticky: true,
            })
            .await;
        self.os_notify(title, body, true).await;
    }

    async fn new_session_alert(&self, session: &ChatSession) {
        tracing::debug!(
            "Session {} entered the queue at {} priority",
            session.id,
            session.priority.to_str()
        );
        if session.priority == SessionPriority::Urgent {
            self.urgent_session_alert(session).await;
            return;
        }

        let tone = if session.priority == SessionPriority::High {
            AlertTone::Warning
        } else {
            AlertTone::Info
        };
        self.play(tone).await;
        self.sink
            .show_toast(Toast {
                title: format!("New chat from {}", session.customer_name),
                body: session.subject.clone().unwrap_or_default(),
                sticky: false,
            })
            .await;
    }

    async fn customer_message_alert(&self, message: &ChatMessage) {
        let preview = truncate_preview(&message.content, self.preview_chars);

        self.play(AlertTone::Message).await;
        self.sink
            .show_toast(Toast {
                title: "New customer message".into(),
                body: preview.clone(),
                sticky: false,
            })
            .await;
        self.os_notify("New customer message".into(), preview, false)
            .await;
    }

    /// Reduce one feed event into zero or one alert.
    pub async fn handle_event(&self, event: &FeedEvent) {
        match event {
            FeedEvent::Session { kind, session } => match kind {
                ChangeKind::Insert => {
                    self.state
                        .lock()
                        .await
                        .priorities
                        .insert(session.id, session.priority);
                    self.new_session_alert(session).await;
                }
                ChangeKind::Update => {
                    let was_urgent = {
                        let mut state = self.state.lock().await;
                        let previous = state.priorities.insert(session.id, session.priority);
                        matches!(previous, Some(SessionPriority::Urgent))
                    };
                    // Edge-triggered: only the transition into urgent
                    // alerts; staying urgent or de-escalating does not.
                    if session.priority == SessionPriority::Urgent && !was_urgent {
                        self.urgent_session_alert(session).await;
                    }
                }
                ChangeKind::Delete => {
                    self.state.lock().await.priorities.remove(&session.id);
                }
            },
            FeedEvent::Message { kind, message } => {
                if *kind == ChangeKind::Insert && message.sender_type == SenderType::Customer {
                    self.customer_message_alert(message).await;
                }
            }
        }
    }

    /// Consume the feed until shutdown. A lost subscription quietly ends
    /// the loop; the directory's polling bounds the resulting staleness.
    pub async fn run_forever(self: Arc<Self>, shutdown: impl std::future::Future<Output = ()>) {
        let mut rx = self.feed.subscribe();
        let mut shutdown = Box::pin(shutdown);
        self.ensure_permission().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("NotificationDispatcher: shutdown requested, exiting loop");
                    break;
                }
                received = rx.recv() => match received {
                    Ok(event) => self.handle_event(&event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!("Dispatcher lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => {
                        tracing::debug!("Feed closed, dispatcher going quiet");
                        break;
                    }
                },
            }
        }
    }
}
