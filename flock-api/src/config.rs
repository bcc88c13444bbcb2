use flock_common::{
    model::auth::HashCost,
    snowflake::{ProcessId, WorkerId},
};
use serde::Deserialize;
use std::{
    fmt::{Debug, Formatter},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
}

#[derive(Clone, Eq, PartialEq, Hash, Deserialize)]
#[serde(transparent)]
pub struct JwtSecret(String);

impl JwtSecret {
    #[must_use]
    pub fn new(secret: String) -> Self {
        Self(secret)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl Debug for JwtSecret {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("JwtSecret").field(&"[redacted]").finish()
    }
}

/// Process configuration, read from the environment (and `.env` if present).
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
pub struct Config {
    #[serde(default = "default_server_address")]
    pub server_address: IpAddr,
    #[serde(default = "default_server_port")]
    pub server_port: u16,
    /// Without it everything lives in memory.
    #[serde(default)]
    pub database_url: Option<String>,
    pub jwt_secret: JwtSecret,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u32,
    #[serde(default = "default_post_delay_ms")]
    pub post_delay_ms: u64,
    #[serde(default)]
    pub snowflake_worker_id: WorkerId,
    #[serde(default)]
    pub snowflake_process_id: ProcessId,
    #[serde(default = "default_auth_rate_limit")]
    pub auth_rate_limit_per_minute: u32,
    #[serde(default = "default_post_rate_limit")]
    pub post_rate_limit_per_minute: u32,
    #[serde(default = "default_hash_memory_kib")]
    pub password_hash_memory_kib: u32,
    #[serde(default = "default_hash_iterations")]
    pub password_hash_iterations: u32,
}

fn default_server_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_server_port() -> u16 {
    3000
}

fn default_token_ttl_hours() -> u32 {
    24
}

fn default_post_delay_ms() -> u64 {
    5000
}

fn default_auth_rate_limit() -> u32 {
    5
}

fn default_post_rate_limit() -> u32 {
    3
}

fn default_hash_memory_kib() -> u32 {
    HashCost::default().memory_kib
}

fn default_hash_iterations() -> u32 {
    HashCost::default().iterations
}

impl Config {
    /// All defaults, only the secret has to be provided.
    #[must_use]
    pub fn new(jwt_secret: JwtSecret) -> Self {
        Self {
            server_address: default_server_address(),
            server_port: default_server_port(),
            database_url: None,
            jwt_secret,
            token_ttl_hours: default_token_ttl_hours(),
            post_delay_ms: default_post_delay_ms(),
            snowflake_worker_id: WorkerId::default(),
            snowflake_process_id: ProcessId::default(),
            auth_rate_limit_per_minute: default_auth_rate_limit(),
            post_rate_limit_per_minute: default_post_rate_limit(),
            password_hash_memory_kib: default_hash_memory_kib(),
            password_hash_iterations: default_hash_iterations(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if e.not_found() {
                debug!("No .env file found");
            } else {
                return Err(e.into());
            }
        }

        envy::from_env().map_err(ConfigError::from)
    }

    #[must_use]
    pub fn socket_address(&self) -> SocketAddr {
        SocketAddr::new(self.server_address, self.server_port)
    }

    #[must_use]
    pub fn token_ttl(&self) -> time::Duration {
        time::Duration::hours(i64::from(self.token_ttl_hours))
    }

    #[must_use]
    pub fn post_delay(&self) -> Duration {
        Duration::from_millis(self.post_delay_ms)
    }

    #[must_use]
    pub fn hash_cost(&self) -> HashCost {
        HashCost {
            memory_kib: self.password_hash_memory_kib,
            iterations: self.password_hash_iterations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, JwtSecret};
    use std::time::Duration;

    #[test]
    fn defaults() {
        let config = Config::new(JwtSecret::new("s".to_owned()));

        assert_eq!(config.socket_address().port(), 3000);
        assert_eq!(config.post_delay(), Duration::from_secs(5));
        assert_eq!(config.token_ttl(), time::Duration::hours(24));
        assert_eq!(config.auth_rate_limit_per_minute, 5);
        assert_eq!(config.post_rate_limit_per_minute, 3);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn secret_is_not_printed() {
        let config = Config::new(JwtSecret::new("hunter2".to_owned()));
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
