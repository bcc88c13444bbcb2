use crate::service::{
    credentials::CredentialService,
    notifications::NotificationService,
    pipeline::{PostPipeline, PostWorker},
    presence::PresenceRegistry,
    relationships::RelationshipService,
    timeline::TimelineService,
    tokens::TokenKeys,
};
use flock_common::{model::auth::HashCost, snowflake::SnowflakeGenerator};
use flock_db::Store;
use std::{sync::Arc, time::Duration};

pub mod credentials;
pub mod error;
pub mod notifications;
pub mod pipeline;
pub mod presence;
pub mod relationships;
pub mod timeline;
pub mod tokens;

#[cfg(test)]
pub(crate) mod test_support;

/// Everything behind the HTTP surface, wired against one store.
pub struct Services {
    pub tokens: Arc<TokenKeys>,
    pub credentials: Arc<CredentialService>,
    pub presence: Arc<PresenceRegistry>,
    pub notifications: Arc<NotificationService>,
    pub relationships: Arc<RelationshipService>,
    pub pipeline: Arc<PostPipeline>,
    pub timeline: Arc<TimelineService>,
}

impl Services {
    pub fn new(
        store: Arc<dyn Store>,
        tokens: Arc<TokenKeys>,
        hash_cost: HashCost,
        post_delay: Duration,
        job_ids: SnowflakeGenerator,
    ) -> (Self, PostWorker) {
        let credentials = Arc::new(CredentialService::new(
            store.clone(),
            tokens.clone(),
            hash_cost,
        ));
        let presence = Arc::new(PresenceRegistry::new(tokens.clone()));
        let notifications = Arc::new(NotificationService::new(store.clone(), presence.clone()));
        let relationships = Arc::new(RelationshipService::new(
            store.clone(),
            notifications.clone(),
        ));
        let (pipeline, worker) =
            PostPipeline::new(store.clone(), notifications.clone(), post_delay, job_ids);
        let timeline = Arc::new(TimelineService::new(store));

        let services = Self {
            tokens,
            credentials,
            presence,
            notifications,
            relationships,
            pipeline: Arc::new(pipeline),
            timeline,
        };

        (services, worker)
    }
}
