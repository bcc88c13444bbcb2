use crate::{
    server::{
        Result, ServerError, ServerRouter,
        json::{Json, Reply},
        rate_limit::AuthQuota,
    },
    service::credentials::{AuthResponse, CredentialService, Login, Registration},
};
use axum::extract::State;
use axum_extra::routing::{RouterExt, TypedPath};
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> ServerRouter {
    ServerRouter::new().typed_post(register).typed_post(login)
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/register", rejection(ServerError))]
struct RegisterPath();

async fn register(
    RegisterPath(): RegisterPath,
    State(credentials): State<Arc<CredentialService>>,
    _: AuthQuota,
    Json(registration): Json<Registration>,
) -> Result<Reply<AuthResponse>> {
    let response = credentials.register(registration).await?;

    Ok(Reply::created(response))
}

#[derive(TypedPath, Deserialize)]
#[typed_path("/auth/login", rejection(ServerError))]
struct LoginPath();

async fn login(
    LoginPath(): LoginPath,
    State(credentials): State<Arc<CredentialService>>,
    _: AuthQuota,
    Json(login): Json<Login>,
) -> Result<Json<AuthResponse>> {
    let response = credentials.login(login).await?;

    Ok(Json(response))
}
