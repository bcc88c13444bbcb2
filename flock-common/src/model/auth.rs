use crate::{
    model::{Id, user::UserMarker},
    util::char_len_within,
};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{self, PasswordHasher, PasswordVerifier, SaltString},
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error, Unexpected},
};
use std::fmt::{Debug, Formatter};
use thiserror::Error;

pub const PASSWORD_MAX_LEN: usize = 128;
pub const PASSWORD_SALT_LEN: usize = 16;

/// Claims of the signed access token.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: Id<UserMarker>,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Password hashing failed: {0}")]
pub struct PasswordHashError(password_hash::Error);

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("The password must be between 1 and {PASSWORD_MAX_LEN} characters long")]
pub struct InvalidPasswordError;

/// A plaintext password as submitted by a client.
#[derive(Clone, Eq, PartialEq)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Result<Self, InvalidPasswordError> {
        if char_len_within(&password, 1, PASSWORD_MAX_LEN) {
            Ok(Self(password))
        } else {
            Err(InvalidPasswordError)
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }
}

impl Debug for Password {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Password").field(&"[redacted]").finish()
    }
}

impl<'de> Deserialize<'de> for Password {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        Password::new(inner)
            .map_err(|_| Error::invalid_value(Unexpected::Other("password"), &"Password"))
    }
}

/// Argon2id cost parameters. Fixed per deployment.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
        }
    }
}

impl HashCost {
    fn hasher(self) -> Result<Argon2<'static>, PasswordHashError> {
        let params = Params::new(self.memory_kib, self.iterations, 1, None)
            .map_err(|err| PasswordHashError(err.into()))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// PHC formatted Argon2id hash.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn generate(password: &Password, cost: HashCost) -> Result<Self, PasswordHashError> {
        Self::hash_bytes(password.get().as_bytes(), cost)
    }

    /// Hash of random bytes, for equalizing work when there is nothing to verify against.
    pub fn decoy(cost: HashCost) -> Result<Self, PasswordHashError> {
        let secret: [u8; 32] = rand::random();
        Self::hash_bytes(&secret, cost)
    }

    fn hash_bytes(secret: &[u8], cost: HashCost) -> Result<Self, PasswordHashError> {
        let salt_bytes: [u8; PASSWORD_SALT_LEN] = rand::random();
        let salt = SaltString::encode_b64(&salt_bytes).map_err(PasswordHashError)?;

        let hash = cost
            .hasher()?
            .hash_password(secret, &salt)
            .map_err(PasswordHashError)?;

        Ok(Self(hash.to_string()))
    }

    /// Wraps a hash read back from storage.
    #[must_use]
    pub fn from_phc(phc: String) -> Self {
        Self(phc)
    }

    #[must_use]
    pub fn as_phc(&self) -> &str {
        &self.0
    }

    /// The cost parameters are read from the hash itself.
    pub fn verify(&self, password: &str) -> Result<bool, PasswordHashError> {
        let parsed = password_hash::PasswordHash::new(&self.0).map_err(PasswordHashError)?;

        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(password_hash::Error::Password) => Ok(false),
            Err(err) => Err(PasswordHashError(err)),
        }
    }
}

impl Debug for PasswordHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("PasswordHash").field(&"[redacted]").finish()
    }
}
