//! Process configuration from environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_REDIS_URL: &str = "redis://host.docker.internal:6379";
pub const DEFAULT_QUEUE_NAME: &str = jobgate_infra::queue::DEFAULT_QUEUE_NAME;
pub const DEFAULT_STALE_AFTER_SECS: u64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be set when {reason}")]
    Missing { name: &'static str, reason: &'static str },

    #[error("{name} has an invalid value '{value}': {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// How bearer tokens are verified.
#[derive(Clone, PartialEq, Eq)]
pub enum IdentityConfig {
    /// Locally, as HS256 JWTs.
    Jwt { secret: String },
    /// By the external identity provider.
    Remote { base_url: String, api_key: String },
}

impl std::fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityConfig::Jwt { .. } => f.debug_struct("Jwt").finish_non_exhaustive(),
            IdentityConfig::Remote { base_url, .. } => f
                .debug_struct("Remote")
                .field("base_url", base_url)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct QueueConfig {
    pub url: String,
    pub password: Option<String>,
    pub name: String,
    pub connect_timeout: Duration,
}

impl std::fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConfig")
            .field("url", &self.url)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("name", &self.name)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    pub interval: Duration,
    pub stale_after: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub queue: QueueConfig,
    pub identity: IdentityConfig,
    pub frontend_url: Option<String>,
    pub cors_strict: bool,
    /// `None` leaves the reconciliation sweep off.
    pub reconcile: Option<ReconcileConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_raw = get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_raw.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
            name: "BIND_ADDR",
            value: bind_raw.clone(),
            reason: e.to_string(),
        })?;

        let use_persistent_stores = parse_bool("USE_PERSISTENT_STORES", get("USE_PERSISTENT_STORES"))?;
        let database_url = get("DATABASE_URL");
        if use_persistent_stores && database_url.is_none() {
            return Err(ConfigError::Missing {
                name: "DATABASE_URL",
                reason: "USE_PERSISTENT_STORES=true",
            });
        }

        let queue = QueueConfig {
            url: get("MY_REDIS_URL")
                .or_else(|| get("REDIS_URL"))
                .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            password: get("REDIS_PASSWORD"),
            name: get("QUEUE_NAME").unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_string()),
            connect_timeout: Duration::from_millis(parse_u64(
                "QUEUE_CONNECT_TIMEOUT_MS",
                get("QUEUE_CONNECT_TIMEOUT_MS"),
                5_000,
            )?),
        };

        let auth_url = get("AUTH_URL").or_else(|| get("SUPABASE_URL"));
        let auth_key = get("AUTH_API_KEY").or_else(|| get("SUPABASE_ANON_KEY"));
        let identity = match (auth_url, auth_key, get("JWT_SECRET")) {
            (Some(base_url), Some(api_key), _) => IdentityConfig::Remote { base_url, api_key },
            (Some(_), None, _) => {
                return Err(ConfigError::Missing {
                    name: "AUTH_API_KEY",
                    reason: "AUTH_URL is set",
                });
            }
            (None, _, Some(secret)) => IdentityConfig::Jwt { secret },
            (None, _, None) => {
                return Err(ConfigError::Missing {
                    name: "JWT_SECRET",
                    reason: "no AUTH_URL is configured",
                });
            }
        };

        let reconcile = match get("RECONCILE_INTERVAL_SECS") {
            None => None,
            Some(raw) => {
                let interval = parse_u64("RECONCILE_INTERVAL_SECS", Some(raw), 0)?;
                if interval == 0 {
                    None
                } else {
                    Some(ReconcileConfig {
                        interval: Duration::from_secs(interval),
                        stale_after: Duration::from_secs(parse_u64(
                            "RECONCILE_STALE_AFTER_SECS",
                            get("RECONCILE_STALE_AFTER_SECS"),
                            DEFAULT_STALE_AFTER_SECS,
                        )?),
                    })
                }
            }
        };

        Ok(Self {
            bind_addr,
            use_persistent_stores,
            database_url,
            queue,
            identity,
            frontend_url: get("FRONTEND_URL"),
            cors_strict: parse_bool("CORS_STRICT", get("CORS_STRICT"))?,
            reconcile,
        })
    }
}

fn parse_bool(name: &'static str, value: Option<String>) -> Result<bool, ConfigError> {
    match value.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(ConfigError::Invalid {
            name,
            value: other.to_string(),
            reason: "expected true or false".into(),
        }),
    }
}

fn parse_u64(name: &'static str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
