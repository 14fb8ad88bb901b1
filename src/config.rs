//! Configuration module for environment variables and application settings
//!
//! Every signing secret and integration key must come from the environment.
//! A missing value is a startup error; there are no built-in fallbacks.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono::FixedOffset;
use url::Url;

#[derive(Clone)]
pub struct Config {
    pub server: ServerConfig,

    /// Where bookings, guests and requests live
    pub store: StoreConfig,

    /// Guest-facing booking token settings
    pub auth: AuthConfig,

    /// Outbound CRM relay settings
    pub crm: CrmConfig,

    /// Automation webhook used for unit-lock lookups
    pub unit_lock: UnitLockConfig,

    /// Local offset of the property, used to place check-in/check-out times
    pub stay_utc_offset: FixedOffset,

    /// Shared key for the booking ingest endpoint; the route is disabled when unset
    pub ingest_api_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Clone)]
pub enum StoreConfig {
    Postgres { url: String, max_connections: usize },
    Memory,
}

#[derive(Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Clone)]
pub struct CrmConfig {
    pub api_url: Url,
    pub api_key: String,
    pub timeout: Duration,
}

#[derive(Clone)]
pub struct UnitLockConfig {
    pub webhook_url: Url,
    pub jwt_secret: String,
    pub timeout: Duration,
}

// Secrets stay out of debug output.
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("store", &self.store)
            .field("auth", &self.auth)
            .field("crm", &self.crm)
            .field("unit_lock", &self.unit_lock)
            .field("stay_utc_offset", &self.stay_utc_offset)
            .field("ingest_api_key", &self.ingest_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres { max_connections, .. } => f
                .debug_struct("Postgres")
                .field("url", &"<redacted>")
                .field("max_connections", max_connections)
                .finish(),
            Self::Memory => f.write_str("Memory"),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig").field("jwt_secret", &"<redacted>").finish()
    }
}

impl std::fmt::Debug for CrmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmConfig")
            .field("api_url", &self.api_url.as_str())
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl std::fmt::Debug for UnitLockConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitLockConfig")
            .field("webhook_url", &self.webhook_url.as_str())
            .field("jwt_secret", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| var(key).ok_or_else(|| anyhow!("{key} environment variable is required"));

        let store = match var("STORE_BACKEND").as_deref() {
            None | Some("postgres") => StoreConfig::Postgres {
                url: required("DATABASE_URL")?,
                max_connections: parse_or(var("DATABASE_MAX_CONNECTIONS"), 16, "DATABASE_MAX_CONNECTIONS")?,
            },
            Some("memory") => StoreConfig::Memory,
            Some(other) => bail!("STORE_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        };

        let offset_minutes: i32 = parse_or(var("STAY_UTC_OFFSET_MINUTES"), 0, "STAY_UTC_OFFSET_MINUTES")?;
        let stay_utc_offset = FixedOffset::east_opt(offset_minutes * 60)
            .ok_or_else(|| anyhow!("STAY_UTC_OFFSET_MINUTES out of range: {offset_minutes}"))?;

        Ok(Self {
            server: ServerConfig {
                host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(var("PORT"), 3000, "PORT")?,
                cors_allowed_origins: var("CORS_ALLOWED_ORIGINS")
                    .map(|origins| {
                        origins
                            .split(',')
                            .map(str::trim)
                            .filter(|o| !o.is_empty())
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_else(|| vec!["http://localhost:3000".to_string()]),
            },
            store,
            auth: AuthConfig {
                jwt_secret: required("JWT_SECRET")?,
            },
            crm: CrmConfig {
                api_url: parse_url(&required("ARQAAM_API_URL")?, "ARQAAM_API_URL")?,
                api_key: required("ARQAAM_API_KEY")?,
                timeout: Duration::from_secs(parse_or(var("CRM_TIMEOUT_SECS"), 30, "CRM_TIMEOUT_SECS")?),
            },
            unit_lock: UnitLockConfig {
                webhook_url: parse_url(&required("N8N_UNIT_LOCK_WEBHOOK_URL")?, "N8N_UNIT_LOCK_WEBHOOK_URL")?,
                jwt_secret: required("N8N_JWT_SECRET")?,
                timeout: Duration::from_secs(parse_or(var("N8N_TIMEOUT_SECS"), 30, "N8N_TIMEOUT_SECS")?),
            },
            stay_utc_offset,
            ingest_api_key: var("BOOKING_INGEST_API_KEY"),
        })
    }
}

fn parse_or<T>(value: Option<String>, default: T, key: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(raw) => raw.parse().with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn parse_url(raw: &str, key: &str) -> Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("{key} is not a valid URL"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        bail!("{key} must use http or https");
    }
    Ok(url)
}
