use crate::service::error::{Result, ServiceError};
use flock_common::model::{Id, post::Post, user::UserMarker};
use flock_db::Store;
use std::sync::Arc;

pub struct TimelineService {
    store: Arc<dyn Store>,
}

impl TimelineService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Posts of everyone the user follows, newest first. The user's own posts are not included.
    pub async fn timeline(&self, user_id: Id<UserMarker>) -> Result<Vec<Post>> {
        let user = self
            .store
            .fetch_user(user_id)
            .await?
            .ok_or(ServiceError::user_not_found(user_id))?;

        if user.following.is_empty() {
            return Ok(Vec::new());
        }

        let following: Vec<_> = user.following.into_iter().collect();
        Ok(self.store.fetch_posts_by_authors(&following).await?)
    }

    pub async fn all_posts(&self) -> Result<Vec<Post>> {
        Ok(self.store.fetch_all_posts().await?)
    }

    /// An unknown author simply has no posts.
    pub async fn posts_by_author(&self, author_id: Id<UserMarker>) -> Result<Vec<Post>> {
        Ok(self.store.fetch_posts_by_authors(&[author_id]).await?)
    }
}
