use crate::errors::{AppError, AppResult};
use crate::models::Notification;
use crate::store::{DocumentStore, QueryFilter, QuerySubscription, NOTIFICATIONS_COLLECTION};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

// Append-only per-user feed over the notifications collection. Entries are
// never merged: two identical messages are two records.
#[derive(Clone)]
pub struct NotificationFeed {
    store: Arc<dyn DocumentStore>,
}

impl NotificationFeed {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn append(&self, user_id: &str, message: &str) -> AppResult<Notification> {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            message: message.to_string(),
            read: false,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&notification)?;
        self.store
            .set_document(NOTIFICATIONS_COLLECTION, &notification.id, value)
            .await?;
        Ok(notification)
    }

    // Read-transition failures are logged, not raised; the unread view only
    // changes once the write lands and the subscription pushes a snapshot.
    pub async fn mark_read(&self, notification_id: &str) {
        if let Err(error) = self.try_mark_read(notification_id).await {
            tracing::warn!(error = %error, notification_id, "mark-read failed");
        }
    }

    async fn try_mark_read(&self, notification_id: &str) -> AppResult<()> {
        let document = self
            .store
            .get_document(NOTIFICATIONS_COLLECTION, notification_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("notification {notification_id}")))?;

        let mut notification: Notification = serde_json::from_value(document)?;
        notification.read = true;
        let value = serde_json::to_value(&notification)?;
        self.store
            .set_document(NOTIFICATIONS_COLLECTION, notification_id, value)
            .await
    }

    pub async fn subscribe(&self, user_id: &str) -> AppResult<NotificationStream> {
        let filter = QueryFilter::new()
            .field_eq("userId", user_id)
            .field_eq("read", false);
        let subscription = self
            .store
            .subscribe_query(NOTIFICATIONS_COLLECTION, filter)
            .await?;
        Ok(NotificationStream { subscription })
    }
}

// Live unread view in arrival order. Each snapshot replaces the previous
// one; documents that fail to decode are skipped with a warning.
pub struct NotificationStream {
    subscription: QuerySubscription,
}

impl NotificationStream {
    pub async fn next_snapshot(&mut self) -> Option<Vec<Notification>> {
        let documents = self.subscription.next_snapshot().await?;
        let mut notifications = Vec::with_capacity(documents.len());
        for document in documents {
            match serde_json::from_value::<Notification>(document.data) {
                Ok(notification) => notifications.push(notification),
                Err(error) => {
                    tracing::warn!(error = %error, key = %document.key, "undecodable notification skipped")
                }
            }
        }
        Some(notifications)
    }

    pub fn cancel(&mut self) {
        self.subscription.cancel();
    }
}
