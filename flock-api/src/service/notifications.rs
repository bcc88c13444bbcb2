use crate::service::{
    error::{Missing, Result, ServiceError},
    presence::{PresenceRegistry, ServerEvent},
};
use async_trait::async_trait;
use flock_common::model::{
    Id,
    notification::{NewNotification, Notification, NotificationKind, NotificationMarker},
    user::{UserMarker, Username},
};
use flock_db::Store;
use std::sync::Arc;
use tracing::debug;

/// Where the relationship service and the post worker send their events.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        recipient_id: Id<UserMarker>,
        kind: NotificationKind,
    ) -> Result<Notification>;

    async fn notify_follow(
        &self,
        recipient_id: Id<UserMarker>,
        follower_id: Id<UserMarker>,
        follower_username: Username,
    ) -> Result<Notification> {
        self.notify(
            recipient_id,
            NotificationKind::Follow {
                follower_id,
                follower_username,
            },
        )
        .await
    }
}

pub struct NotificationService {
    store: Arc<dyn Store>,
    presence: Arc<PresenceRegistry>,
}

impl NotificationService {
    pub fn new(store: Arc<dyn Store>, presence: Arc<PresenceRegistry>) -> Self {
        Self { store, presence }
    }

    /// Newest first.
    pub async fn list_for_user(&self, user_id: Id<UserMarker>) -> Result<Vec<Notification>> {
        Ok(self.store.fetch_notifications(user_id).await?)
    }

    pub async fn mark_read(
        &self,
        user_id: Id<UserMarker>,
        notification_id: Id<NotificationMarker>,
    ) -> Result<()> {
        if self
            .store
            .mark_notification_read(user_id, notification_id)
            .await?
        {
            Ok(())
        } else {
            Err(ServiceError::NotFound(Missing::Notification(
                notification_id,
            )))
        }
    }
}

#[async_trait]
impl NotificationSink for NotificationService {
    /// Pushes live when the recipient is online and always persists.
    async fn notify(
        &self,
        recipient_id: Id<UserMarker>,
        kind: NotificationKind,
    ) -> Result<Notification> {
        let delivered = self
            .presence
            .push(recipient_id, ServerEvent::Notification(kind.payload()))
            .await;

        let notification = self
            .store
            .create_notification(&NewNotification { recipient_id, kind })
            .await?;

        debug!(
            %recipient_id,
            notification_id = %notification.id,
            kind = %notification.notification_type,
            delivered,
            "Stored notification"
        );

        Ok(notification)
    }
}
