//! # Operator Notifications
//!
//! Transient messages for the operator: realtime alerts, action results and
//! safe-mode outcomes. Nothing here is stored; a notification nobody listens
//! to is simply gone.

use std::fmt;

use tokio::sync::broadcast;

use crate::models::stream::AlertPayload;

/// Slots kept for slow listeners before the oldest notification is dropped.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationLevel {
    /// Maps a backend alert severity onto a level.
    pub fn from_severity(severity: &str) -> Self {
        match severity.to_ascii_lowercase().as_str() {
            "critical" | "error" => NotificationLevel::Error,
            "warning" | "warn" => NotificationLevel::Warning,
            "success" | "ok" => NotificationLevel::Success,
            _ => NotificationLevel::Info,
        }
    }
}

impl fmt::Display for NotificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotificationLevel::Info => "info",
            NotificationLevel::Success => "success",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self { level, title: title.into(), message: message.into() }
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }
}

impl From<&AlertPayload> for Notification {
    fn from(alert: &AlertPayload) -> Self {
        Self::new(
            NotificationLevel::from_severity(&alert.severity),
            alert.title.clone(),
            alert.message.clone(),
        )
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "[{}] {}", self.level, self.title)
        } else {
            write!(f, "[{}] {}: {}", self.level, self.title, self.message)
        }
    }
}

/// Cloneable fan-out handle.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn notify(&self, notification: Notification) {
        log::debug!("Notification: {}", notification);
        // No listeners is fine.
        let _ = self.tx.send(notification);
    }
}
