//! Notification fan-out.
//!
//! The workflow depends on an injected sink, never a process-wide push
//! channel. The production sink persists a notification row; real-time
//! delivery to the recipient is the external transport's job. Sink
//! failures are logged by the caller and never surface to the client.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use oppflow_core::domain::notification::{Notification, NotificationId};
use oppflow_core::domain::user::UserId;
use oppflow_db::repositories::{NotificationRepository, RepositoryError};

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: Notification) -> Result<(), RepositoryError>;
}

pub fn build_notification(recipient: &UserId, title: &str, body: String) -> Notification {
    Notification {
        id: NotificationId(Uuid::new_v4().to_string()),
        recipient_id: recipient.clone(),
        title: title.to_string(),
        body,
        is_read: false,
        created_at: Utc::now(),
    }
}

/// Persists notifications for the out-of-scope push transport to pick up.
pub struct DbNotificationSink {
    notifications: Arc<dyn NotificationRepository>,
}

impl DbNotificationSink {
    pub fn new(notifications: Arc<dyn NotificationRepository>) -> Self {
        Self { notifications }
    }
}

#[async_trait]
impl NotificationSink for DbNotificationSink {
    async fn deliver(&self, notification: Notification) -> Result<(), RepositoryError> {
        self.notifications.save(notification).await
    }
}
