use crate::{
    server::{AuthenticatedUser, ServerError},
    service::tokens::TokenKeys,
};
use axum::{
    extract::{ConnectInfo, FromRef, FromRequestParts},
    http::request::Parts,
};
use flock_common::model::{Id, user::UserMarker};
use governor::{
    DefaultKeyedRateLimiter, Quota,
    clock::{Clock, DefaultClock},
};
use std::{
    hash::Hash,
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tracing::debug;

const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Error)]
#[error("Too many requests, try again in {}s", .retry_after.as_secs().max(1))]
pub struct RateLimited {
    pub retry_after: Duration,
}

/// Per key quota of requests per minute, replenished continuously.
///
/// A limit of zero rejects everything.
pub struct RateLimiter<K: Clone + Eq + Hash> {
    limiter: Option<DefaultKeyedRateLimiter<K>>,
    clock: DefaultClock,
}

impl<K: Clone + Eq + Hash> RateLimiter<K> {
    pub fn per_minute(limit: u32) -> Self {
        Self {
            limiter: NonZeroU32::new(limit)
                .map(|limit| governor::RateLimiter::keyed(Quota::per_minute(limit))),
            clock: DefaultClock::default(),
        }
    }

    pub fn check(&self, key: &K) -> Result<(), RateLimited> {
        let Some(limiter) = &self.limiter else {
            return Err(RateLimited {
                retry_after: Duration::from_secs(60),
            });
        };

        if limiter.len() > PRUNE_THRESHOLD {
            limiter.retain_recent();
        }

        limiter.check_key(key).map_err(|not_until| {
            let retry_after = not_until.wait_time_from(self.clock.now());
            debug!(retry_after_ms = retry_after.as_millis(), "Rate limit hit");
            RateLimited { retry_after }
        })
    }
}

/// Limits for the expensive or spammable endpoints.
pub struct RateLimits {
    pub auth: RateLimiter<IpAddr>,
    pub posts: RateLimiter<Id<UserMarker>>,
}

impl RateLimits {
    pub fn new(auth_per_minute: u32, posts_per_minute: u32) -> Self {
        Self {
            auth: RateLimiter::per_minute(auth_per_minute),
            posts: RateLimiter::per_minute(posts_per_minute),
        }
    }
}

/// Counts the request against the caller address' auth quota before the body is read.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct AuthQuota;

impl<S> FromRequestParts<S> for AuthQuota
where
    Arc<RateLimits>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let ConnectInfo(peer) = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .map_err(ServerError::MissingConnectInfo)?;

        Arc::<RateLimits>::from_ref(state).auth.check(&peer.ip())?;

        Ok(Self)
    }
}

/// An authenticated caller that still had post quota left, checked before the body is read.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct PostQuota(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for PostQuota
where
    Arc<RateLimits>: FromRef<S>,
    Arc<TokenKeys>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthenticatedUser::from_request_parts(parts, state).await?;

        Arc::<RateLimits>::from_ref(state)
            .posts
            .check(&user.user_id())?;

        Ok(Self(user))
    }
}

#[cfg(test)]
mod tests {
    use super::RateLimiter;
    use std::time::Duration;

    #[test]
    fn limits_per_key() {
        let limiter = RateLimiter::per_minute(2);

        assert!(limiter.check(&"a").is_ok());
        assert!(limiter.check(&"a").is_ok());

        let limited = limiter.check(&"a").unwrap_err();
        assert!(limited.retry_after > Duration::from_secs(29));
        assert!(limited.retry_after <= Duration::from_secs(30));

        assert!(limiter.check(&"b").is_ok());
    }

    #[test]
    fn zero_limit_always_rejects() {
        let limiter = RateLimiter::per_minute(0);
        assert!(limiter.check(&"key").is_err());
    }
}
