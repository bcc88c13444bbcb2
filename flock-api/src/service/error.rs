use crate::service::tokens::TokenError;
use flock_common::model::{
    Id,
    auth::PasswordHashError,
    notification::NotificationMarker,
    user::{UserMarker, Username},
};
use flock_db::{DbError, UniqueField};
use std::fmt::Display;
use thiserror::Error;
use tokio::task::JoinError;

pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Missing {
    User(Id<UserMarker>),
    Username(Username),
    Notification(Id<NotificationMarker>),
}

impl Display for Missing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Missing::User(id) => write!(f, "User with id {id}"),
            Missing::Username(username) => write!(f, "User {}", username.get()),
            Missing::Notification(id) => write!(f, "Notification with id {id}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("A user with this {0} is already registered.")]
    Conflict(UniqueField),
    #[error("Invalid credentials.")]
    Unauthorized,
    #[error("{0} was not found.")]
    NotFound(Missing),
    #[error("Invalid operation: {0}.")]
    InvalidOperation(&'static str),
    #[error(transparent)]
    Store(DbError),
    #[error(transparent)]
    PasswordHash(#[from] PasswordHashError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("Blocking task failed: {0}")]
    Blocking(#[from] JoinError),
    #[error("The post queue is no longer accepting jobs.")]
    QueueClosed,
}

impl From<DbError> for ServiceError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Duplicate(field) => ServiceError::Conflict(field),
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    #[must_use]
    pub fn user_not_found(user_id: Id<UserMarker>) -> Self {
        ServiceError::NotFound(Missing::User(user_id))
    }
}
