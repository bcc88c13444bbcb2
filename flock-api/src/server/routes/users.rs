use crate::{
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        json::{Json, Message},
    },
    service::relationships::{FollowOutcome, RelationshipService, UnfollowOutcome},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use flock_common::model::{
    Id,
    user::{User, UserMarker, Username},
};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_profile)
        .typed_get(get_all_users)
        .typed_post(get_user_batch)
        .typed_get(get_user_by_username)
        .typed_post(follow)
        .typed_post(unfollow)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/user/profile", rejection(ServerError))]
struct ProfilePath();

async fn get_profile(
    ProfilePath(): ProfilePath,
    State(relationships): State<Arc<RelationshipService>>,
    user: AuthenticatedUser,
) -> Result<Json<User>> {
    let profile = relationships.find_by_id(user.user_id()).await?;

    Ok(Json(profile))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/user/all", rejection(ServerError))]
struct AllUsersPath();

async fn get_all_users(
    AllUsersPath(): AllUsersPath,
    State(relationships): State<Arc<RelationshipService>>,
    _: AuthenticatedUser,
) -> Result<Json<Vec<User>>> {
    let users = relationships.find_all().await?;

    Ok(Json(users))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/user/batch", rejection(ServerError))]
struct UserBatchPath();

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
struct UserBatch {
    ids: Vec<Id<UserMarker>>,
}

async fn get_user_batch(
    UserBatchPath(): UserBatchPath,
    State(relationships): State<Arc<RelationshipService>>,
    _: AuthenticatedUser,
    Json(batch): Json<UserBatch>,
) -> Result<Json<Vec<User>>> {
    let users = relationships.find_by_ids(&batch.ids).await?;

    Ok(Json(users))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/user/{username}", rejection(ServerError))]
struct UserByNamePath {
    username: Username,
}

async fn get_user_by_username(
    UserByNamePath { username }: UserByNamePath,
    State(relationships): State<Arc<RelationshipService>>,
    _: AuthenticatedUser,
) -> Result<Json<User>> {
    let user = relationships.find_by_username(&username).await?;

    Ok(Json(user))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/user/follow/{user_id}", rejection(ServerError))]
struct FollowPath {
    user_id: Id<UserMarker>,
}

async fn follow(
    FollowPath { user_id }: FollowPath,
    State(relationships): State<Arc<RelationshipService>>,
    user: AuthenticatedUser,
) -> Result<Json<Message>> {
    let message = match relationships.follow(user.user_id(), user_id).await? {
        FollowOutcome::Followed => "Followed successfully",
        FollowOutcome::AlreadyFollowing => "Already following",
    };

    Ok(Message::json(message))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/user/unfollow/{user_id}", rejection(ServerError))]
struct UnfollowPath {
    user_id: Id<UserMarker>,
}

async fn unfollow(
    UnfollowPath { user_id }: UnfollowPath,
    State(relationships): State<Arc<RelationshipService>>,
    user: AuthenticatedUser,
) -> Result<Json<Message>> {
    let message = match relationships.unfollow(user.user_id(), user_id).await? {
        UnfollowOutcome::Unfollowed => "Unfollowed successfully",
        UnfollowOutcome::NotFollowing => "Not following",
    };

    Ok(Message::json(message))
}
