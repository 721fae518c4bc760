// ============================================================================
// User Notifications
// ============================================================================
//
// Failures that the user should see (session could not open, session closed
// on the server, ...) are reported here instead of being returned as errors.
// The host UI drains the queue; every notification is also logged.
//
// ============================================================================

pub mod message;

pub use message::Message;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{Level, event};
use uuid::Uuid;

/// Severity of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: NotificationLevel,
    pub message: Message,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: Message) -> Self {
        Self {
            id: Uuid::new_v4(),
            level,
            message,
            created_at: Utc::now(),
        }
    }
}

/// Destination for user-visible notifications.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, level: NotificationLevel, message: Message);

    fn user_error(&self, message: Message) {
        self.notify(NotificationLevel::Error, message);
    }

    fn user_warning(&self, message: Message) {
        self.notify(NotificationLevel::Warning, message);
    }

    fn info(&self, message: Message) {
        self.notify(NotificationLevel::Info, message);
    }
}

/// Bounded in-memory notification queue.
///
/// When full, the oldest notification is dropped.
pub struct NotificationManager {
    queue: Mutex<VecDeque<Notification>>,
    capacity: usize,
}

impl Default for NotificationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationManager {
    const DEFAULT_CAPACITY: usize = 64;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    /// All pending notifications, oldest first
    pub fn list(&self) -> Vec<Notification> {
        self.lock().iter().cloned().collect()
    }

    /// Pending notification messages, oldest first
    pub fn messages(&self) -> Vec<Message> {
        self.lock().iter().map(|n| n.message.clone()).collect()
    }

    /// Remove one notification. Returns false if it was already gone.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut queue = self.lock();
        let before = queue.len();
        queue.retain(|n| n.id != id);
        queue.len() != before
    }

    pub fn dismiss_all(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Notification>> {
        // A panicking reader cannot leave the queue half-updated
        self.queue.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl NotificationSink for NotificationManager {
    fn notify(&self, level: NotificationLevel, message: Message) {
        match level {
            NotificationLevel::Info => event!(Level::INFO, code = message.code(), "{}", message),
            NotificationLevel::Warning => {
                event!(Level::WARN, code = message.code(), "{}", message)
            }
            NotificationLevel::Error => event!(Level::ERROR, code = message.code(), "{}", message),
        }

        let mut queue = self.lock();
        if queue.len() == self.capacity {
            queue.pop_front();
        }
        queue.push_back(Notification::new(level, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_error_is_queued() {
        let notifications = NotificationManager::new();
        notifications.user_error(Message::SessionClosedOnServer);

        let list = notifications.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].level, NotificationLevel::Error);
        assert_eq!(list[0].message, Message::SessionClosedOnServer);
    }

    #[test]
    fn test_dismiss() {
        let notifications = NotificationManager::new();
        notifications.info(Message::FailedToRefreshDatabases);
        notifications.user_warning(Message::SessionClosedOnServer);

        let id = notifications.list()[0].id;
        assert!(notifications.dismiss(id));
        assert!(!notifications.dismiss(id));
        assert_eq!(notifications.messages(), vec![Message::SessionClosedOnServer]);

        notifications.dismiss_all();
        assert!(notifications.is_empty());
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let notifications = NotificationManager::with_capacity(2);
        notifications.user_error(Message::FailedToRefreshDatabases);
        notifications.user_error(Message::SessionClosedOnServer);
        notifications.user_error(Message::TransactionClosedOnServer);

        assert_eq!(
            notifications.messages(),
            vec![Message::SessionClosedOnServer, Message::TransactionClosedOnServer]
        );
    }
}
