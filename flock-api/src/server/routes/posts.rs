use crate::{
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        json::{Json, Reply},
        rate_limit::PostQuota,
    },
    service::{
        pipeline::{JobReceipt, PostPipeline},
        timeline::TimelineService,
    },
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use flock_common::model::{
    Id,
    post::{Post, PostContent},
    user::UserMarker,
};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_post(create_post)
        .typed_get(get_timeline)
        .typed_get(get_all_posts)
        .typed_get(get_user_posts)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts", rejection(ServerError))]
struct CreatePostPath();

async fn create_post(
    CreatePostPath(): CreatePostPath,
    State(pipeline): State<Arc<PostPipeline>>,
    PostQuota(user): PostQuota,
    Json(content): Json<PostContent>,
) -> Result<Reply<JobReceipt>> {
    let receipt = pipeline.submit(user.user_id(), content).await?;

    Ok(Reply::accepted(receipt))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/timeline", rejection(ServerError))]
struct TimelinePath();

async fn get_timeline(
    TimelinePath(): TimelinePath,
    State(timeline): State<Arc<TimelineService>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Post>>> {
    let posts = timeline.timeline(user.user_id()).await?;

    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/all", rejection(ServerError))]
struct AllPostsPath();

async fn get_all_posts(
    AllPostsPath(): AllPostsPath,
    State(timeline): State<Arc<TimelineService>>,
    _: AuthenticatedUser,
) -> Result<Json<Vec<Post>>> {
    let posts = timeline.all_posts().await?;

    Ok(Json(posts))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/posts/user/{user_id}", rejection(ServerError))]
struct UserPostsPath {
    user_id: Id<UserMarker>,
}

async fn get_user_posts(
    UserPostsPath { user_id }: UserPostsPath,
    State(timeline): State<Arc<TimelineService>>,
    _: AuthenticatedUser,
) -> Result<Json<Vec<Post>>> {
    let posts = timeline.posts_by_author(user_id).await?;

    Ok(Json(posts))
}
