// alert.rs
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertTone {
    Info,
    Warning,
    Urgent,
    Message,
}

impl AlertTone {
    pub fn to_str(&self) -> &'static str {
        match self {
            AlertTone::Info => "info",
            AlertTone::Warning => "warning",
            AlertTone::Urgent => "urgent",
            AlertTone::Message => "message",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub title: String,
    pub body: String,
    /// Sticky toasts stay until the user dismisses them.
    pub sticky: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OsNotification {
    pub title: String,
    pub body: String,
    /// Notifications requiring interaction do not auto-dismiss.
    pub require_interaction: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPermission {
    Granted,
    Denied,
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Sound playback failed: {0}")]
    Playback(String),
}

/// Presentation outputs for the notification dispatcher. Toasts and OS
/// notifications are fire-and-forget; only the one-shot permission prompt
/// reports back. Sound playback may fail (autoplay restrictions) and the
/// dispatcher swallows that.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn request_permission(&self) -> NotificationPermission;

    async fn play_sound(&self, tone: AlertTone) -> Result<(), AlertError>;

    async fn show_toast(&self, toast: Toast);

    async fn push_os_notification(&self, notification: OsNotification);
}

/// Default sink that writes alerts to the log, for headless runs and the
/// demo binary.
pub struct LogAlertSink;

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn request_permission(&self) -> NotificationPermission {
        NotificationPermission::Granted
    }

    async fn play_sound(&self, tone: AlertTone) -> Result<(), AlertError> {
        tracing::debug!("Playing {} tone", tone.to_str());
        Ok(())
    }

    async fn show_toast(&self, toast: Toast) {
        tracing::info!(
            "Toast{}: {} — {}",
            if toast.sticky { " (sticky)" } else { "" },
            toast.title,
            toast.body
        );
    }

    async fn push_os_notification(&self, notification: OsNotification) {
        tracing::info!(
            "OS notification: {} — {}",
            notification.title,
            notification.body
        );
    }
}
