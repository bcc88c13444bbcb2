use crate::store::{DbError, IdGenerator, Result, Store, UniqueField};
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
use std::{
    cmp::Reverse,
    collections::{BTreeSet, HashMap},
};
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: HashMap<Id<UserMarker>, UserCredentials>,
    posts: Vec<Post>,
    notifications: Vec<Notification>,
}

impl Tables {
    fn relation_set(
        &mut self,
        user_id: Id<UserMarker>,
        select: fn(&mut User) -> &mut BTreeSet<Id<UserMarker>>,
    ) -> Option<&mut BTreeSet<Id<UserMarker>>> {
        self.users
            .get_mut(&user_id)
            .map(|credentials| select(&mut credentials.user))
    }
}

/// Process-local [`Store`] used by tests and by deployments without a database.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    ids: IdGenerator,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(WorkerId::default(), ProcessId::default())
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            ids: IdGenerator::new(SnowflakeGenerator::new(worker_id, process_id)),
        }
    }
}

fn newest_first<T>(items: &mut [T], key: impl Fn(&T) -> (OffsetDateTime, u64)) {
    items.sort_by_key(|item| Reverse(key(item)));
}

fn following(user: &mut User) -> &mut BTreeSet<Id<UserMarker>> {
    &mut user.following
}

fn followers(user: &mut User) -> &mut BTreeSet<Id<UserMarker>> {
    &mut user.followers
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let mut tables = self.tables.write().await;

        for existing in tables.users.values() {
            if existing.user.email == user.email {
                return Err(DbError::Duplicate(UniqueField::Email));
            }
            if existing.user.username == user.username {
                return Err(DbError::Duplicate(UniqueField::Username));
            }
        }

        let created = User {
            id: self.ids.next(),
            email: user.email.clone(),
            username: user.username.clone(),
            followers: BTreeSet::new(),
            following: BTreeSet::new(),
        };
        tables.users.insert(
            created.id,
            UserCredentials {
                user: created.clone(),
                password_hash: user.password_hash.clone(),
            },
        );

        Ok(created)
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .get(&user_id)
            .map(|credentials| credentials.user.clone()))
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|credentials| &credentials.user.username == username)
            .map(|credentials| credentials.user.clone()))
    }

    async fn fetch_credentials(&self, email: &Email) -> Result<Option<UserCredentials>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|credentials| &credentials.user.email == email)
            .cloned())
    }

    async fn fetch_users(&self, user_ids: &[Id<UserMarker>]) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        let unique: BTreeSet<_> = user_ids.iter().collect();

        Ok(unique
            .into_iter()
            .filter_map(|id| tables.users.get(id))
            .map(|credentials| credentials.user.clone())
            .collect())
    }

    async fn fetch_all_users(&self) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables
            .users
            .values()
            .map(|credentials| credentials.user.clone())
            .collect();
        users.sort_by_key(|user| user.id);

        Ok(users)
    }

    async fn add_following(
        &self,
        user_id: Id<UserMarker>,
        target: Id<UserMarker>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .relation_set(user_id, following)
            .is_some_and(|set| set.insert(target)))
    }

    async fn remove_following(
        &self,
        user_id: Id<UserMarker>,
        target: Id<UserMarker>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .relation_set(user_id, following)
            .is_some_and(|set| set.remove(&target)))
    }

    async fn add_follower(
        &self,
        user_id: Id<UserMarker>,
        follower: Id<UserMarker>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .relation_set(user_id, followers)
            .is_some_and(|set| set.insert(follower)))
    }

    async fn remove_follower(
        &self,
        user_id: Id<UserMarker>,
        follower: Id<UserMarker>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .relation_set(user_id, followers)
            .is_some_and(|set| set.remove(&follower)))
    }

    async fn create_post(&self, post: &NewPost) -> Result<Post> {
        let post_id: Id<PostMarker> = self.ids.next();
        let created = Post {
            id: post_id,
            title: post.content.title.clone(),
            description: post.content.description.clone(),
            author_id: post.author_id,
            author_username: post.author_username.clone(),
            created_at: OffsetDateTime::now_utc(),
        };

        self.tables.write().await.posts.push(created.clone());
        Ok(created)
    }

    async fn fetch_posts_by_authors(&self, authors: &[Id<UserMarker>]) -> Result<Vec<Post>> {
        let tables = self.tables.read().await;
        let mut posts: Vec<Post> = tables
            .posts
            .iter()
            .filter(|post| authors.contains(&post.author_id))
            .cloned()
            .collect();
        newest_first(&mut posts, |post| (post.created_at, post.id.into()));

        Ok(posts)
    }

    async fn fetch_all_posts(&self) -> Result<Vec<Post>> {
        let mut posts = self.tables.read().await.posts.clone();
        newest_first(&mut posts, |post| (post.created_at, post.id.into()));

        Ok(posts)
    }

    async fn create_notification(&self, notification: &NewNotification) -> Result<Notification> {
        let kind = &notification.kind;
        let created = Notification {
            id: self.ids.next(),
            recipient_id: notification.recipient_id,
            notification_type: kind.notification_type(),
            message: kind.message(),
            from_user_id: kind.from_user_id(),
            post_id: kind.post_id(),
            created_at: OffsetDateTime::now_utc(),
            read: false,
        };

        self.tables
            .write()
            .await
            .notifications
            .push(created.clone());
        Ok(created)
    }

    async fn fetch_notifications(&self, recipient: Id<UserMarker>) -> Result<Vec<Notification>> {
        let tables = self.tables.read().await;
        let mut notifications: Vec<Notification> = tables
            .notifications
            .iter()
            .filter(|notification| notification.recipient_id == recipient)
            .cloned()
            .collect();
        newest_first(&mut notifications, |notification| {
            (notification.created_at, notification.id.into())
        });

        Ok(notifications)
    }

    async fn mark_notification_read(
        &self,
        recipient: Id<UserMarker>,
        notification_id: Id<NotificationMarker>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let notification = tables.notifications.iter_mut().find(|notification| {
            notification.id == notification_id && notification.recipient_id == recipient
        });

        Ok(notification.is_some_and(|notification| {
            notification.read = true;
            true
        }))
    }
}
