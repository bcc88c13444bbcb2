use async_trait::async_trait;
use flock_common::{
    model::{
        Id, ModelValidationError,
        notification::{NewNotification, Notification, NotificationMarker},
        post::{NewPost, Post},
        user::{Email, NewUser, User, UserCredentials, UserMarker, Username},
    },
    snowflake::SnowflakeGenerator,
};
use std::{
    fmt::Display,
    sync::{Mutex, PoisonError},
};
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum UniqueField {
    Email,
    Username,
}

impl Display for UniqueField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UniqueField::Email => f.write_str("email"),
            UniqueField::Username => f.write_str("username"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("A user with this {0} already exists")]
    Duplicate(UniqueField),
    #[error("Running migrations failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Persistence for users, posts and notifications.
///
/// Relationship writes touch a single user record each and report whether they changed
/// anything. Keeping both sides of a follow consistent is the caller's job.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, user: &NewUser) -> Result<User>;

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>>;

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>>;

    async fn fetch_credentials(&self, email: &Email) -> Result<Option<UserCredentials>>;

    /// Unknown ids are skipped.
    async fn fetch_users(&self, user_ids: &[Id<UserMarker>]) -> Result<Vec<User>>;

    async fn fetch_all_users(&self) -> Result<Vec<User>>;

    async fn add_following(&self, user_id: Id<UserMarker>, target: Id<UserMarker>)
    -> Result<bool>;

    async fn remove_following(
        &self,
        user_id: Id<UserMarker>,
        target: Id<UserMarker>,
    ) -> Result<bool>;

    async fn add_follower(&self, user_id: Id<UserMarker>, follower: Id<UserMarker>)
    -> Result<bool>;

    async fn remove_follower(
        &self,
        user_id: Id<UserMarker>,
        follower: Id<UserMarker>,
    ) -> Result<bool>;

    async fn create_post(&self, post: &NewPost) -> Result<Post>;

    /// Newest first.
    async fn fetch_posts_by_authors(&self, authors: &[Id<UserMarker>]) -> Result<Vec<Post>>;

    /// Newest first.
    async fn fetch_all_posts(&self) -> Result<Vec<Post>>;

    async fn create_notification(&self, notification: &NewNotification) -> Result<Notification>;

    /// Newest first.
    async fn fetch_notifications(&self, recipient: Id<UserMarker>) -> Result<Vec<Notification>>;

    /// Returns `false` if the recipient has no such notification.
    async fn mark_notification_read(
        &self,
        recipient: Id<UserMarker>,
        notification_id: Id<NotificationMarker>,
    ) -> Result<bool>;
}

pub(crate) struct IdGenerator(Mutex<SnowflakeGenerator>);

impl IdGenerator {
    pub(crate) fn new(generator: SnowflakeGenerator) -> Self {
        Self(Mutex::new(generator))
    }

    pub(crate) fn next<Marker>(&self) -> Id<Marker> {
        let mut generator = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        Id::generate(&mut generator)
    }
}
