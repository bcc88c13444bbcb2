use crate::{
    config::Config,
    server::rate_limit::{RateLimited, RateLimits},
    service::{
        Services,
        credentials::CredentialService,
        error::ServiceError,
        notifications::NotificationService,
        pipeline::{PostPipeline, PostWorker},
        presence::PresenceRegistry,
        relationships::RelationshipService,
        timeline::TimelineService,
        tokens::{TokenError, TokenKeys},
    },
};
use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{ExtensionRejection, JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use flock_common::{
    snowflake::SnowflakeGenerator,
    util::{NonPositiveDurationError, PositiveDuration},
};
use flock_db::Store;
use json::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

mod auth;
mod json;
pub mod rate_limit;
mod routes;

pub use auth::AuthenticatedUser;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub tokens: Arc<TokenKeys>,
    pub credentials: Arc<CredentialService>,
    pub presence: Arc<PresenceRegistry>,
    pub notifications: Arc<NotificationService>,
    pub relationships: Arc<RelationshipService>,
    pub pipeline: Arc<PostPipeline>,
    pub timeline: Arc<TimelineService>,
    pub limits: Arc<RateLimits>,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid token lifetime: {0}")]
    TokenTtl(#[from] NonPositiveDurationError),
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl ServerState {
    /// Wires all services. The returned worker has to be spawned for posts to publish.
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Result<(Self, PostWorker), StateError> {
        let ttl = PositiveDuration::try_from(config.token_ttl())?;
        let tokens = Arc::new(TokenKeys::new(config.jwt_secret.as_bytes(), ttl)?);
        let job_ids =
            SnowflakeGenerator::new(config.snowflake_worker_id, config.snowflake_process_id);

        let (services, worker) = Services::new(
            store,
            tokens,
            config.hash_cost(),
            config.post_delay(),
            job_ids,
        );

        let state = Self {
            tokens: services.tokens,
            credentials: services.credentials,
            presence: services.presence,
            notifications: services.notifications,
            relationships: services.relationships,
            pipeline: services.pipeline,
            timeline: services.timeline,
            limits: Arc::new(RateLimits::new(
                config.auth_rate_limit_per_minute,
                config.post_rate_limit_per_minute,
            )),
        };

        Ok((state, worker))
    }
}

pub fn routes() -> ServerRouter {
    routes::routes().fallback(fallback)
}

/// The complete application, ready to be served with connect info.
pub fn app(state: ServerState) -> Router {
    routes()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was missing or invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("Provided token was invalid: {0}")]
    InvalidToken(TokenError),
    #[error("Connection info unavailable: {0}")]
    MissingConnectInfo(ExtensionRejection),
    #[error(transparent)]
    RateLimited(#[from] RateLimited),
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_) | ServerError::PathRejection(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidAuthorizationHeader(_) | ServerError::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
            ServerError::JsonRejection(_) => StatusCode::BAD_REQUEST,
            ServerError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            ServerError::JsonResponse(_) | ServerError::MissingConnectInfo(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ServerError::Service(err) => match err {
                ServiceError::Conflict(_) | ServiceError::InvalidOperation(_) => {
                    StatusCode::BAD_REQUEST
                }
                ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
                ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                ServiceError::QueueClosed => StatusCode::SERVICE_UNAVAILABLE,
                ServiceError::Store(_)
                | ServiceError::PasswordHash(_)
                | ServiceError::Token(_)
                | ServiceError::Blocking(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
            "Internal server error".to_owned()
        } else {
            warn!(error = %self, %status, "Replying with error");
            self.to_string()
        };

        let error_response = ErrorResponse {
            status: status.as_u16(),
            message,
        };
        (status, Json(error_response)).into_response()
    }
}
