use flock_common::{
    model::{Id, auth::Claims, user::UserMarker},
    util::PositiveDuration,
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("The signing secret must not be empty")]
    EmptySecret,
    #[error("Token could not be signed: {0}")]
    Sign(jsonwebtoken::errors::Error),
    #[error("Token was rejected: {0}")]
    Invalid(jsonwebtoken::errors::Error),
}

pub trait TokenIssuer: Send + Sync {
    fn issue(&self, user_id: Id<UserMarker>) -> Result<String, TokenError>;
}

pub trait TokenVerifier: Send + Sync {
    /// Checks signature and expiry.
    fn verify(&self, token: &str) -> Result<Claims, TokenError>;
}

/// HS256 keys derived from one shared secret.
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: PositiveDuration,
}

impl TokenKeys {
    pub fn new(secret: &[u8], ttl: PositiveDuration) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::EmptySecret);
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
            ttl,
        })
    }

    fn claims_at(&self, user_id: Id<UserMarker>, now: OffsetDateTime) -> Claims {
        let iat = now.unix_timestamp();

        Claims {
            user_id,
            iat,
            exp: iat.saturating_add(self.ttl.get().whole_seconds()),
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, TokenError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding).map_err(TokenError::Sign)
    }
}

impl TokenIssuer for TokenKeys {
    fn issue(&self, user_id: Id<UserMarker>) -> Result<String, TokenError> {
        self.sign(&self.claims_at(user_id, OffsetDateTime::now_utc()))
    }
}

impl TokenVerifier for TokenKeys {
    fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::Invalid)
    }
}
