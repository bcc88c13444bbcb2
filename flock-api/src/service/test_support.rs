use crate::service::{error::Result, notifications::NotificationSink};
use async_trait::async_trait;
use flock_common::model::{
    Id,
    auth::PasswordHash,
    notification::{NewNotification, Notification, NotificationKind, NotificationMarker},
    post::{NewPost, Post},
    user::{Email, NewUser, User, UserCredentials, UserMarker, Username},
};
use flock_db::{DbError, MemoryStore, Store};
use std::sync::Mutex;
use time::OffsetDateTime;

pub(crate) fn new_user(name: &str) -> NewUser {
    NewUser {
        email: Email::new(format!("{name}@example.com")).unwrap(),
        username: Username::new(name.to_owned()).unwrap(),
        password_hash: PasswordHash::from_phc("unused".to_owned()),
    }
}

/// Records notifications instead of storing or pushing them.
#[derive(Debug, Default)]
pub(crate) struct RecordingSink {
    sent: Mutex<Vec<(Id<UserMarker>, NotificationKind)>>,
}

impl RecordingSink {
    pub(crate) fn sent(&self) -> Vec<(Id<UserMarker>, NotificationKind)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn notify(
        &self,
        recipient_id: Id<UserMarker>,
        kind: NotificationKind,
    ) -> Result<Notification> {
        let mut sent = self.sent.lock().unwrap();
        let notification = Notification {
            id: Id::from(sent.len() as u64 + 1),
            recipient_id,
            notification_type: kind.notification_type(),
            message: kind.message(),
            from_user_id: kind.from_user_id(),
            post_id: kind.post_id(),
            created_at: OffsetDateTime::now_utc(),
            read: false,
        };
        sent.push((recipient_id, kind));
        Ok(notification)
    }
}

/// A [`MemoryStore`] with selected writes failing.
#[derive(Default)]
pub(crate) struct FlakyStore {
    inner: MemoryStore,
    fail_follower_writes: bool,
    fail_posts: bool,
}

impl FlakyStore {
    pub(crate) fn failing_follower_writes() -> Self {
        Self {
            fail_follower_writes: true,
            ..Self::default()
        }
    }

    pub(crate) fn failing_posts() -> Self {
        Self {
            fail_posts: true,
            ..Self::default()
        }
    }
}

fn unavailable() -> DbError {
    DbError::Sqlx(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl Store for FlakyStore {
    async fn create_user(&self, user: &NewUser) -> flock_db::Result<User> {
        self.inner.create_user(user).await
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> flock_db::Result<Option<User>> {
        self.inner.fetch_user(user_id).await
    }

    async fn fetch_user_by_username(
        &self,
        username: &Username,
    ) -> flock_db::Result<Option<User>> {
        self.inner.fetch_user_by_username(username).await
    }

    async fn fetch_credentials(
        &self,
        email: &Email,
    ) -> flock_db::Result<Option<UserCredentials>> {
        self.inner.fetch_credentials(email).await
    }

    async fn fetch_users(&self, user_ids: &[Id<UserMarker>]) -> flock_db::Result<Vec<User>> {
        self.inner.fetch_users(user_ids).await
    }

    async fn fetch_all_users(&self) -> flock_db::Result<Vec<User>> {
        self.inner.fetch_all_users().await
    }

    async fn add_following(
        &self,
        user_id: Id<UserMarker>,
        target: Id<UserMarker>,
    ) -> flock_db::Result<bool> {
        self.inner.add_following(user_id, target).await
    }

    async fn remove_following(
        &self,
        user_id: Id<UserMarker>,
        target: Id<UserMarker>,
    ) -> flock_db::Result<bool> {
        self.inner.remove_following(user_id, target).await
    }

    async fn add_follower(
        &self,
        user_id: Id<UserMarker>,
        follower: Id<UserMarker>,
    ) -> flock_db::Result<bool> {
        if self.fail_follower_writes {
            return Err(unavailable());
        }
        self.inner.add_follower(user_id, follower).await
    }

    async fn remove_follower(
        &self,
        user_id: Id<UserMarker>,
        follower: Id<UserMarker>,
    ) -> flock_db::Result<bool> {
        if self.fail_follower_writes {
            return Err(unavailable());
        }
        self.inner.remove_follower(user_id, follower).await
    }

    async fn create_post(&self, post: &NewPost) -> flock_db::Result<Post> {
        if self.fail_posts {
            return Err(unavailable());
        }
        self.inner.create_post(post).await
    }

    async fn fetch_posts_by_authors(
        &self,
        authors: &[Id<UserMarker>],
    ) -> flock_db::Result<Vec<Post>> {
        self.inner.fetch_posts_by_authors(authors).await
    }

    async fn fetch_all_posts(&self) -> flock_db::Result<Vec<Post>> {
        self.inner.fetch_all_posts().await
    }

    async fn create_notification(
        &self,
        notification: &NewNotification,
    ) -> flock_db::Result<Notification> {
        self.inner.create_notification(notification).await
    }

    async fn fetch_notifications(
        &self,
        recipient: Id<UserMarker>,
    ) -> flock_db::Result<Vec<Notification>> {
        self.inner.fetch_notifications(recipient).await
    }

    async fn mark_notification_read(
        &self,
        recipient: Id<UserMarker>,
        notification_id: Id<NotificationMarker>,
    ) -> flock_db::Result<bool> {
        self.inner
            .mark_notification_read(recipient, notification_id)
            .await
    }
}
