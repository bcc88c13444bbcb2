use crate::{
    server::{
        Result, ServerError, ServerRouter,
        auth::AuthenticatedUser,
        json::{Json, Message},
    },
    service::notifications::NotificationService,
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use flock_common::model::{
    Id,
    notification::{Notification, NotificationMarker},
};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new()
        .typed_get(get_notifications)
        .typed_post(mark_read)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/notifications", rejection(ServerError))]
struct NotificationsPath();

async fn get_notifications(
    NotificationsPath(): NotificationsPath,
    State(notifications): State<Arc<NotificationService>>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<Notification>>> {
    let list = notifications.list_for_user(user.user_id()).await?;

    Ok(Json(list))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/notifications/{id}/read", rejection(ServerError))]
struct MarkReadPath {
    id: Id<NotificationMarker>,
}

async fn mark_read(
    MarkReadPath { id }: MarkReadPath,
    State(notifications): State<Arc<NotificationService>>,
    user: AuthenticatedUser,
) -> Result<Json<Message>> {
    notifications.mark_read(user.user_id(), id).await?;

    Ok(Message::json("Notification marked as read"))
}
