use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub bcrypt_cost: u32,
    pub cdn_domain: Option<String>,
    pub cors_allowed_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let jwt_secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let cors_allowed_origins = var("CORS_ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_addr: parse_or("BIND_ADDR", var("BIND_ADDR"), SocketAddr::from(([127, 0, 0, 1], 3000)))?,
            database_url: var("DATABASE_URL"),
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", var("DB_MAX_CONNECTIONS"), 10)?,
            jwt_secret,
            token_ttl_hours: parse_or("TOKEN_TTL_HOURS", var("TOKEN_TTL_HOURS"), 24 * 7)?,
            bcrypt_cost: parse_or("BCRYPT_COST", var("BCRYPT_COST"), bcrypt::DEFAULT_COST)?,
            cdn_domain: var("CDN_DOMAIN").map(|d| d.trim_end_matches('/').to_string()),
            cors_allowed_origins,
        })
    }

    /// Public URL of a stored media object, when a CDN is configured.
    pub fn media_url(&self, key: Option<&str>) -> Option<String> {
        let domain = self.cdn_domain.as_deref()?;
        let key = key?.trim_start_matches('/');
        Some(format!("https://{}/{}", domain, key))
    }
}

fn parse_or<T: FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value }),
        None => Ok(default),
    }
}
