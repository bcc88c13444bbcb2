use crate::server::ServerRouter;
use axum::Router;

mod auth;
mod notifications;
mod posts;
mod users;
mod ws;

pub fn routes() -> ServerRouter {
    Router::new()
        .merge(auth::routes())
        .merge(users::routes())
        .merge(posts::routes())
        .merge(notifications::routes())
        .merge(ws::routes())
}
