//! User-facing notifications and the shared pipeline error handler.
//!
//! Success messages ("Styles task complete!") and pipeline failures both go
//! through a [`Notifier`]. The desktop implementation raises an OS
//! notification via `notify-rust`; when that is unavailable (no notification
//! daemon, headless CI) it degrades to a log line. Every notification is also
//! logged, so nothing is lost when popups are disabled.

use std::fmt;
use std::sync::Arc;

/// Title used for every notification sitepipe raises.
pub const APP_TITLE: &str = "sitepipe";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub subtitle: Option<String>,
    pub message: String,
}

impl Notification {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            title: "Success!".to_string(),
            subtitle: None,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            title: APP_TITLE.to_string(),
            subtitle: Some("Error!".to_string()),
            message: message.into(),
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subtitle {
            Some(sub) => write!(f, "{} {}: {}", self.title, sub, self.message),
            None => write!(f, "{}: {}", self.title, self.message),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification);
}

/// OS notifications through `notify-rust`.
pub struct DesktopNotifier;

impl Notifier for DesktopNotifier {
    fn notify(&self, notification: &Notification) {
        tracing::info!("{notification}");
        let body = match &notification.subtitle {
            Some(sub) => format!("{sub} {}", notification.message),
            None => notification.message.clone(),
        };
        let mut popup = notify_rust::Notification::new();
        popup.summary(&notification.title).body(&body);
        if notification.subtitle.is_some() {
            popup.sound_name("Beep");
        }
        if let Err(e) = popup.show() {
            tracing::debug!(error = %e, "desktop notification unavailable");
        }
    }
}

/// Log-only notifications (`--quiet` and non-interactive runs).
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        tracing::info!("{notification}");
    }
}

/// The single place recoverable pipeline failures end up.
///
/// The caller reports the failure and carries on with the next file; the
/// failure never aborts the task.
#[derive(Clone)]
pub struct ErrorHandler {
    notifier: Arc<dyn Notifier>,
}

impl ErrorHandler {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn report(&self, error: &dyn fmt::Display) {
        let message = error.to_string();
        tracing::error!("{message}");
        self.notifier.notify(&Notification::error(message));
    }
}
