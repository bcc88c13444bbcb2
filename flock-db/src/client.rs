use crate::{
    record::{NotificationRecord, PostRecord, UserRecord},
    store::{DbError, IdGenerator, Result, Store, UniqueField},
};
use async_trait::async_trait;
use flock_common::{
    model::{
        Id,
        notification::{NewNotification, Notification, NotificationMarker},
        post::{NewPost, Post, PostMarker},
        user::{Email, NewUser, User, UserCredentials, UserMarker, Username},
    },
    snowflake::{ProcessId, SnowflakeGenerator, WorkerId},
};
use sqlx::{PgPool, postgres::PgPoolOptions, query, query_as};
use time::OffsetDateTime;
use tracing::debug;

const USER_COLUMNS: &str = "user_snowflake, email, username, password_hash, followers, following";
const POST_COLUMNS: &str =
    "post_snowflake, title, description, author_snowflake, author_username, created_at";
const NOTIFICATION_COLUMNS: &str = "notification_snowflake, recipient_snowflake, \
    notification_type, message, from_user_snowflake, post_snowflake, created_at, read";

pub struct DbClient {
    pool: PgPool,
    ids: IdGenerator,
}

impl DbClient {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            pool,
            ids: IdGenerator::new(SnowflakeGenerator::new(worker_id, process_id)),
        }
    }

    pub async fn connect(
        database_url: &str,
        worker_id: WorkerId,
        process_id: ProcessId,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self::new(pool, worker_id, process_id))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Database migrations applied");
        Ok(())
    }

    async fn fetch_user_where(&self, condition: &str, value: &str) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users.users WHERE {condition} = $1");
        let record = query_as::<_, UserRecord>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    /// Conditional array update on a single user row, `true` if the row changed.
    async fn update_relation(&self, sql: &str, user_id: i64, other: i64) -> Result<bool> {
        let result = query(sql)
            .bind(user_id)
            .bind(other)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}

fn map_unique_violation(err: sqlx::Error) -> DbError {
    if let sqlx::Error::Database(db_err) = &err
        && db_err.is_unique_violation()
    {
        match db_err.constraint() {
            Some("users_email_key") => return DbError::Duplicate(UniqueField::Email),
            Some("users_username_key") => return DbError::Duplicate(UniqueField::Username),
            _ => {}
        }
    }

    DbError::Sqlx(err)
}

#[async_trait]
impl Store for DbClient {
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let user_id: Id<UserMarker> = self.ids.next();

        let sql = format!(
            "INSERT INTO users.users (user_snowflake, email, username, password_hash)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}"
        );
        let record = query_as::<_, UserRecord>(&sql)
            .bind(user_id.to_db())
            .bind(user.email.get())
            .bind(user.username.get())
            .bind(user.password_hash.as_phc())
            .fetch_one(&self.pool)
            .await
            .map_err(map_unique_violation)?;

        Ok(User::try_from(record)?)
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users.users WHERE user_snowflake = $1");
        let record = query_as::<_, UserRecord>(&sql)
            .bind(user_id.to_db())
            .fetch_optional(&self.pool)
            .await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let record = self.fetch_user_where("username", username.get()).await?;

        let user = record.map(User::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_credentials(&self, email: &Email) -> Result<Option<UserCredentials>> {
        let record = self.fetch_user_where("email", email.get()).await?;

        let credentials = record.map(UserCredentials::try_from).transpose()?;
        Ok(credentials)
    }

    async fn fetch_users(&self, user_ids: &[Id<UserMarker>]) -> Result<Vec<User>> {
        let snowflakes: Vec<i64> = user_ids.iter().map(|id| id.to_db()).collect();

        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users.users
            WHERE user_snowflake = ANY($1)
            ORDER BY user_snowflake"
        );
        let records = query_as::<_, UserRecord>(&sql)
            .bind(snowflakes)
            .fetch_all(&self.pool)
            .await?;

        let users = records
            .into_iter()
            .map(User::try_from)
            .collect::<Result<_, _>>()?;
        Ok(users)
    }

    async fn fetch_all_users(&self) -> Result<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users.users ORDER BY user_snowflake");
        let records = query_as::<_, UserRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let users = records
            .into_iter()
            .map(User::try_from)
            .collect::<Result<_, _>>()?;
        Ok(users)
    }

    async fn add_following(
        &self,
        user_id: Id<UserMarker>,
        target: Id<UserMarker>,
    ) -> Result<bool> {
        self.update_relation(
            "UPDATE users.users SET following = array_append(following, $2)
            WHERE user_snowflake = $1 AND NOT ($2 = ANY(following))",
            user_id.to_db(),
            target.to_db(),
        )
        .await
    }

    async fn remove_following(
        &self,
        user_id: Id<UserMarker>,
        target: Id<UserMarker>,
    ) -> Result<bool> {
        self.update_relation(
            "UPDATE users.users SET following = array_remove(following, $2)
            WHERE user_snowflake = $1 AND $2 = ANY(following)",
            user_id.to_db(),
            target.to_db(),
        )
        .await
    }

    async fn add_follower(
        &self,
        user_id: Id<UserMarker>,
        follower: Id<UserMarker>,
    ) -> Result<bool> {
        self.update_relation(
            "UPDATE users.users SET followers = array_append(followers, $2)
            WHERE user_snowflake = $1 AND NOT ($2 = ANY(followers))",
            user_id.to_db(),
            follower.to_db(),
        )
        .await
    }

    async fn remove_follower(
        &self,
        user_id: Id<UserMarker>,
        follower: Id<UserMarker>,
    ) -> Result<bool> {
        self.update_relation(
            "UPDATE users.users SET followers = array_remove(followers, $2)
            WHERE user_snowflake = $1 AND $2 = ANY(followers)",
            user_id.to_db(),
            follower.to_db(),
        )
        .await
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let post_id: Id<PostMarker> = self.ids.next();

        let sql = format!(
            "INSERT INTO posts.posts
                (post_snowflake, title, description, author_snowflake, author_username, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {POST_COLUMNS}"
        );
        let record = query_as::<_, PostRecord>(&sql)
            .bind(post_id.to_db())
            .bind(post.content.title.get())
            .bind(post.content.description.get())
            .bind(post.author_id.to_db())
            .bind(post.author_username.get())
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&self.pool)
            .await?;

        Ok(Post::try_from(record)?)
    }

    async fn fetch_posts_by_authors(&self, authors: &[Id<UserMarker>]) -> Result<Vec<Post>> {
        let snowflakes: Vec<i64> = authors.iter().map(|id| id.to_db()).collect();

        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts.posts
            WHERE author_snowflake = ANY($1)
            ORDER BY created_at DESC, post_snowflake DESC"
        );
        let records = query_as::<_, PostRecord>(&sql)
            .bind(snowflakes)
            .fetch_all(&self.pool)
            .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    async fn fetch_all_posts(&self) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts.posts
            ORDER BY created_at DESC, post_snowflake DESC"
        );
        let records = query_as::<_, PostRecord>(&sql)
            .fetch_all(&self.pool)
            .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    async fn create_notification(&self, notification: &NewNotification) -> Result<Notification> {
        let notification_id: Id<NotificationMarker> = self.ids.next();
        let kind = &notification.kind;

        let sql = format!(
            "INSERT INTO notifications.notifications
                (notification_snowflake, recipient_snowflake, notification_type, message,
                 from_user_snowflake, post_snowflake, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {NOTIFICATION_COLUMNS}"
        );
        let record = query_as::<_, NotificationRecord>(&sql)
            .bind(notification_id.to_db())
            .bind(notification.recipient_id.to_db())
            .bind(kind.notification_type().as_str())
            .bind(kind.message())
            .bind(kind.from_user_id().to_db())
            .bind(kind.post_id().map(Id::to_db))
            .bind(OffsetDateTime::now_utc())
            .fetch_one(&self.pool)
            .await?;

        Ok(Notification::try_from(record)?)
    }

    async fn fetch_notifications(&self, recipient: Id<UserMarker>) -> Result<Vec<Notification>> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications.notifications
            WHERE recipient_snowflake = $1
            ORDER BY created_at DESC, notification_snowflake DESC"
        );
        let records = query_as::<_, NotificationRecord>(&sql)
            .bind(recipient.to_db())
            .fetch_all(&self.pool)
            .await?;

        let notifications = records
            .into_iter()
            .map(Notification::try_from)
            .collect::<Result<_, _>>()?;
        Ok(notifications)
    }

    async fn mark_notification_read(
        &self,
        recipient: Id<UserMarker>,
        notification_id: Id<NotificationMarker>,
    ) -> Result<bool> {
        let result = query(
            "UPDATE notifications.notifications SET read = TRUE
            WHERE notification_snowflake = $1 AND recipient_snowflake = $2",
        )
        .bind(notification_id.to_db())
        .bind(recipient.to_db())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
