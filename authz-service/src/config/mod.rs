use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;
use url::Url;

use crate::services::cache::MAX_TTL;
use crate::services::HostAllowList;

#[derive(Debug, Clone)]
pub struct AuthzConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub storage: StorageConfig,
    pub references: ReferenceConfig,
    pub cache: CacheConfig,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ReferenceConfig {
    pub allowed_hosts: HostAllowList,
    pub local_base_url: Url,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
}

impl AuthzConfig {
    pub fn from_env() -> Result<Self, AppError> {
        // Loads .env as a side effect
        let common = core_config::Config::load()?;
        Self::from_source(common, |key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_source<F>(common: core_config::Config, source: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment: Environment = source("ENVIRONMENT")
            .unwrap_or_else(|| "dev".to_string())
            .parse()
            .map_err(config_error)?;
        let is_prod = environment == Environment::Prod;
        let get = |key: &str, default: Option<&str>| get_env(&source, key, default, is_prod);

        let backend: StorageBackend = get("STORAGE_BACKEND", Some("postgres"))?
            .parse()
            .map_err(config_error)?;
        let database_url = match backend {
            StorageBackend::Postgres => Some(get("DATABASE_URL", None)?),
            StorageBackend::Memory => source("DATABASE_URL"),
        };

        let local_base_url = get("LOCAL_BASE_URL", Some("http://localhost:8080"))?;
        let local_base_url = Url::parse(&local_base_url)
            .map_err(|e| config_error(format!("LOCAL_BASE_URL is not a URL: {}", e)))?;

        let ttl_seconds: u64 = parse(&get("AUTHZ_CACHE_TTL_SECONDS", Some("60"))?, "AUTHZ_CACHE_TTL_SECONDS")?;
        let ttl = Duration::from_secs(ttl_seconds);
        if ttl > MAX_TTL {
            return Err(config_error(format!(
                "AUTHZ_CACHE_TTL_SECONDS must not exceed {}",
                MAX_TTL.as_secs()
            )));
        }

        Ok(AuthzConfig {
            common,
            environment,
            service_name: get("SERVICE_NAME", Some("authz-service"))?,
            service_version: get("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")))?,
            log_level: get("LOG_LEVEL", Some("info"))?,
            otlp_endpoint: source("OTLP_ENDPOINT").filter(|s| !s.trim().is_empty()),
            storage: StorageConfig {
                backend,
                database_url,
                max_connections: parse(
                    &get("DATABASE_MAX_CONNECTIONS", Some("10"))?,
                    "DATABASE_MAX_CONNECTIONS",
                )?,
                min_connections: parse(
                    &get("DATABASE_MIN_CONNECTIONS", Some("1"))?,
                    "DATABASE_MIN_CONNECTIONS",
                )?,
            },
            references: ReferenceConfig {
                allowed_hosts: HostAllowList::parse(&get("ALLOWED_HOSTS", Some("localhost"))?),
                local_base_url,
            },
            cache: CacheConfig {
                ttl,
                max_entries: parse(
                    &get("AUTHZ_CACHE_MAX_ENTRIES", Some("10000"))?,
                    "AUTHZ_CACHE_MAX_ENTRIES",
                )?,
            },
            request_timeout: Duration::from_millis(parse(
                &get("REQUEST_TIMEOUT_MS", Some("10000"))?,
                "REQUEST_TIMEOUT_MS",
            )?),
        })
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Environment::Dev => "dev",
            Environment::Prod => "prod",
        })
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(format!("Invalid storage backend: {}", s)),
        }
    }
}

fn config_error(message: String) -> AppError {
    AppError::ConfigError(anyhow::anyhow!(message))
}

fn parse<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, AppError> {
    value
        .trim()
        .parse()
        .map_err(|_| config_error(format!("{} has an invalid value '{}'", key, value)))
}

fn get_env<F>(source: &F, key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match source(key) {
        Some(val) => Ok(val),
        None => {
            if is_prod {
                Err(config_error(format!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(config_error(format!("{} is required but not set", key)))
            }
        }
    }
}
