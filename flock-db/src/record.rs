use flock_common::model::{
    Id, ModelValidationError,
    auth::PasswordHash,
    notification::Notification,
    post::{Post, PostDescription, PostTitle},
    user::{Email, User, UserCredentials, Username},
};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Default, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub followers: Vec<i64>,
    pub following: Vec<i64>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub post_snowflake: i64,
    pub title: String,
    pub description: String,
    pub author_snowflake: i64,
    pub author_username: String,
    pub created_at: OffsetDateTime,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct NotificationRecord {
    pub notification_snowflake: i64,
    pub recipient_snowflake: i64,
    pub notification_type: String,
    pub message: String,
    pub from_user_snowflake: i64,
    pub post_snowflake: Option<i64>,
    pub created_at: OffsetDateTime,
    pub read: bool,
}

impl TryFrom<UserRecord> for UserCredentials {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            user: User {
                id: Id::from_db(value.user_snowflake),
                email: Email::new(value.email)?,
                username: Username::new(value.username)?,
                followers: value.followers.into_iter().map(Id::from_db).collect(),
                following: value.following.into_iter().map(Id::from_db).collect(),
            },
            password_hash: PasswordHash::from_phc(value.password_hash),
        })
    }
}

impl TryFrom<UserRecord> for User {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        UserCredentials::try_from(value).map(|credentials| credentials.user)
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.post_snowflake),
            title: PostTitle::new(value.title)?,
            description: PostDescription::new(value.description)?,
            author_id: Id::from_db(value.author_snowflake),
            author_username: Username::new(value.author_username)?,
            created_at: value.created_at,
        })
    }
}

impl TryFrom<NotificationRecord> for Notification {
    type Error = ModelValidationError;

    fn try_from(value: NotificationRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Id::from_db(value.notification_snowflake),
            recipient_id: Id::from_db(value.recipient_snowflake),
            notification_type: value.notification_type.parse()?,
            message: value.message,
            from_user_id: Id::from_db(value.from_user_snowflake),
            post_id: value.post_snowflake.map(Id::from_db),
            created_at: value.created_at,
            read: value.read,
        })
    }
}
