use crate::service::{
    error::{Result, ServiceError},
    tokens::TokenIssuer,
};
use flock_common::model::{
    auth::{HashCost, Password, PasswordHash},
    user::{Email, NewUser, User, Username},
};
use flock_db::{Store, UniqueField};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::{sync::OnceCell, task};
use tracing::{debug, info};

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
pub struct Registration {
    pub email: Email,
    pub username: Username,
    pub password: Password,
}

#[derive(Clone, Eq, PartialEq, Debug, Deserialize)]
pub struct Login {
    pub email: Email,
    pub password: String,
}

/// Serialized as `{access_token, user}`.
#[derive(Clone, Eq, PartialEq, Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub user: User,
}

pub struct CredentialService {
    store: Arc<dyn Store>,
    tokens: Arc<dyn TokenIssuer>,
    hash_cost: HashCost,
    /// Verified against when the email is unknown, so both failure paths cost a hash.
    decoy: OnceCell<PasswordHash>,
}

impl CredentialService {
    pub fn new(store: Arc<dyn Store>, tokens: Arc<dyn TokenIssuer>, hash_cost: HashCost) -> Self {
        Self {
            store,
            tokens,
            hash_cost,
            decoy: OnceCell::new(),
        }
    }

    pub async fn register(&self, registration: Registration) -> Result<AuthResponse> {
        let Registration {
            email,
            username,
            password,
        } = registration;

        if self.store.fetch_credentials(&email).await?.is_some() {
            return Err(ServiceError::Conflict(UniqueField::Email));
        }

        let cost = self.hash_cost;
        let password_hash =
            task::spawn_blocking(move || PasswordHash::generate(&password, cost)).await??;

        // The unique constraints still catch a concurrent registration.
        let user = self
            .store
            .create_user(&NewUser {
                email,
                username,
                password_hash,
            })
            .await?;

        info!(user_id = %user.id, username = user.username.get(), "Registered user");

        self.respond(user)
    }

    pub async fn login(&self, login: Login) -> Result<AuthResponse> {
        let Login { email, password } = login;

        let Some(credentials) = self.store.fetch_credentials(&email).await? else {
            let decoy = self.decoy().await?.clone();
            task::spawn_blocking(move || decoy.verify(&password)).await??;

            debug!(email = email.get(), "Login for unknown email");
            return Err(ServiceError::Unauthorized);
        };

        let hash = credentials.password_hash;
        if !task::spawn_blocking(move || hash.verify(&password)).await?? {
            debug!(user_id = %credentials.user.id, "Login with wrong password");
            return Err(ServiceError::Unauthorized);
        }

        debug!(user_id = %credentials.user.id, "User logged in");

        self.respond(credentials.user)
    }

    fn respond(&self, user: User) -> Result<AuthResponse> {
        let access_token = self.tokens.issue(user.id)?;
        Ok(AuthResponse { access_token, user })
    }

    async fn decoy(&self) -> Result<&PasswordHash> {
        let cost = self.hash_cost;
        self.decoy
            .get_or_try_init(|| async move {
                let hash = task::spawn_blocking(move || PasswordHash::decoy(cost)).await??;
                Ok::<_, ServiceError>(hash)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::{CredentialService, Login, Registration};
    use crate::service::{
        error::ServiceError,
        tokens::{TokenKeys, TokenVerifier},
    };
    use flock_common::{
        model::{
            auth::{HashCost, Password},
            user::{Email, Username},
        },
        util::PositiveDuration,
    };
    use flock_db::{MemoryStore, UniqueField};
    use std::sync::Arc;
    use time::Duration;

    const CHEAP: HashCost = HashCost {
        memory_kib: 64,
        iterations: 1,
    };

    fn service() -> (CredentialService, Arc<TokenKeys>) {
        let ttl = PositiveDuration::new(Duration::hours(1)).unwrap();
        let keys = Arc::new(TokenKeys::new(b"test-secret", ttl).unwrap());
        let service = CredentialService::new(Arc::new(MemoryStore::default()), keys.clone(), CHEAP);
        (service, keys)
    }

    fn registration(email: &str, username: &str) -> Registration {
        Registration {
            email: Email::new(email.to_owned()).unwrap(),
            username: Username::new(username.to_owned()).unwrap(),
            password: Password::new("pw123".to_owned()).unwrap(),
        }
    }

    fn login(email: &str, password: &str) -> Login {
        Login {
            email: Email::new(email.to_owned()).unwrap(),
            password: password.to_owned(),
        }
    }

    #[tokio::test]
    async fn register_issues_token_for_new_user() {
        let (service, keys) = service();

        let response = service
            .register(registration("a@x.io", "alice"))
            .await
            .unwrap();

        assert_eq!(response.user.username.get(), "alice");
        assert!(response.user.followers.is_empty());
        assert!(response.user.following.is_empty());

        let claims = keys.verify(&response.access_token).unwrap();
        assert_eq!(claims.user_id, response.user.id);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let (service, _) = service();
        service
            .register(registration("a@x.io", "alice"))
            .await
            .unwrap();

        let err = service
            .register(registration("A@X.io", "alice2"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(UniqueField::Email)));
    }

    #[tokio::test]
    async fn duplicate_username_conflicts() {
        let (service, _) = service();
        service
            .register(registration("a@x.io", "alice"))
            .await
            .unwrap();

        let err = service
            .register(registration("b@x.io", "alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(UniqueField::Username)));
    }

    #[tokio::test]
    async fn login_checks_password() {
        let (service, keys) = service();
        let registered = service
            .register(registration("a@x.io", "alice"))
            .await
            .unwrap();

        let response = service.login(login("a@x.io", "pw123")).await.unwrap();
        assert_eq!(response.user.id, registered.user.id);
        assert_eq!(
            keys.verify(&response.access_token).unwrap().user_id,
            registered.user.id
        );

        assert!(matches!(
            service.login(login("a@x.io", "wrong")).await,
            Err(ServiceError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn unknown_email_is_indistinguishable_from_wrong_password() {
        let (service, _) = service();

        let err = service.login(login("nobody@x.io", "pw123")).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized));
        assert_eq!(err.to_string(), ServiceError::Unauthorized.to_string());
    }

    #[tokio::test]
    async fn auth_response_uses_snake_case_token_key() {
        let (service, _) = service();
        let response = service
            .register(registration("a@x.io", "alice"))
            .await
            .unwrap();

        let json = serde_json::to_value(&response).unwrap();

        assert!(json["access_token"].is_string());
        assert!(json.get("accessToken").is_none());
        assert_eq!(json["user"]["username"], "alice");
    }
}
