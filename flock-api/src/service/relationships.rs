use crate::service::{
    error::{Missing, Result, ServiceError},
    notifications::NotificationSink,
};
use flock_common::model::{
    Id,
    user::{User, UserMarker, Username},
};
use flock_db::Store;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum FollowOutcome {
    Followed,
    AlreadyFollowing,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum UnfollowOutcome {
    Unfollowed,
    NotFollowing,
}

/// Owns the follow graph. Both sides of a relation are written together or not at all.
pub struct RelationshipService {
    store: Arc<dyn Store>,
    notifications: Arc<dyn NotificationSink>,
}

impl RelationshipService {
    pub fn new(store: Arc<dyn Store>, notifications: Arc<dyn NotificationSink>) -> Self {
        Self {
            store,
            notifications,
        }
    }

    pub async fn find_by_id(&self, user_id: Id<UserMarker>) -> Result<User> {
        self.store
            .fetch_user(user_id)
            .await?
            .ok_or(ServiceError::user_not_found(user_id))
    }

    pub async fn find_by_username(&self, username: &Username) -> Result<User> {
        self.store
            .fetch_user_by_username(username)
            .await?
            .ok_or_else(|| ServiceError::NotFound(Missing::Username(username.clone())))
    }

    /// Unknown ids are left out of the result.
    pub async fn find_by_ids(&self, user_ids: &[Id<UserMarker>]) -> Result<Vec<User>> {
        Ok(self.store.fetch_users(user_ids).await?)
    }

    pub async fn find_all(&self) -> Result<Vec<User>> {
        Ok(self.store.fetch_all_users().await?)
    }

    pub async fn follow(
        &self,
        current: Id<UserMarker>,
        target: Id<UserMarker>,
    ) -> Result<FollowOutcome> {
        if current == target {
            return Err(ServiceError::InvalidOperation("users cannot follow themselves"));
        }

        let follower = self.find_by_id(current).await?;
        self.find_by_id(target).await?;

        let added = self.store.add_following(current, target).await?;

        if let Err(err) = self.store.add_follower(target, current).await {
            if added {
                let undo = self.store.remove_following(current, target).await;
                compensated("follow", current, target, undo);
            }
            return Err(err.into());
        }

        if !added {
            debug!(%current, %target, "Already following");
            return Ok(FollowOutcome::AlreadyFollowing);
        }

        info!(%current, %target, "User followed");

        if let Err(err) = self
            .notifications
            .notify_follow(target, current, follower.username)
            .await
        {
            warn!(%current, %target, error = %err, "Follow notification failed");
        }

        Ok(FollowOutcome::Followed)
    }

    pub async fn unfollow(
        &self,
        current: Id<UserMarker>,
        target: Id<UserMarker>,
    ) -> Result<UnfollowOutcome> {
        if current == target {
            return Err(ServiceError::InvalidOperation("users cannot unfollow themselves"));
        }

        self.find_by_id(current).await?;
        self.find_by_id(target).await?;

        let removed = self.store.remove_following(current, target).await?;

        if let Err(err) = self.store.remove_follower(target, current).await {
            if removed {
                let undo = self.store.add_following(current, target).await;
                compensated("unfollow", current, target, undo);
            }
            return Err(err.into());
        }

        if removed {
            info!(%current, %target, "User unfollowed");
            Ok(UnfollowOutcome::Unfollowed)
        } else {
            debug!(%current, %target, "Was not following");
            Ok(UnfollowOutcome::NotFollowing)
        }
    }
}

fn compensated(
    operation: &str,
    current: Id<UserMarker>,
    target: Id<UserMarker>,
    undo: flock_db::Result<bool>,
) {
    match undo {
        Ok(_) => warn!(%current, %target, operation, "Rolled back half applied relation change"),
        Err(err) => error!(
            %current,
            %target,
            operation,
            error = %err,
            "Could not roll back half applied relation change"
        ),
    }
}
