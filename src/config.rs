use crate::{health::HealthCheckConfig, service::DEFAULT_MAX_GENERATION_ATTEMPTS};
use anyhow::{Context, Result};
use std::{str::FromStr, time::Duration};

/// Where links are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Sqlite,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(StorageBackend::Sqlite),
            "memory" => Ok(StorageBackend::Memory),
            other => anyhow::bail!("unknown storage backend '{other}' (expected sqlite or memory)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind the HTTP server to, e.g. "0.0.0.0"
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Public base URL, without trailing slash. Used for log output only.
    pub base_url: String,

    pub storage: StorageBackend,

    /// SQLite connection string, e.g. "sqlite:./linkcut.db"
    pub database_url: String,

    /// HS256 key used to verify (and issue) bearer tokens
    pub jwt_secret: String,

    /// Lifetime of tokens issued by `linkcut issue-token`
    pub token_ttl: Duration,

    pub health_check_enabled: bool,
    pub health_check: HealthCheckConfig,

    /// Upper bound on short id draws per created link
    pub max_generation_attempts: usize,
}

impl AppConfig {
    /// Load configuration from environment variables (populated by dotenvy before this is called).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("JWT_SECRET")
            .context("JWT_SECRET must be set in the environment or .env file")?;
        if jwt_secret.trim().is_empty() {
            anyhow::bail!("JWT_SECRET must not be empty");
        }

        let port: u16 = parse_or(&get, "PORT", 8080)
            .context("PORT must be a valid port number (1–65535)")?;

        let base_url = get("BASE_URL")
            .unwrap_or_else(|| format!("http://localhost:{port}"))
            .trim_end_matches('/')
            .to_owned();

        let storage = match get("STORAGE_BACKEND") {
            Some(s) => s.parse()?,
            None => StorageBackend::Sqlite,
        };

        let worker_count: usize = parse_or(&get, "HEALTH_CHECK_WORKERS", 4)?;
        if worker_count == 0 {
            anyhow::bail!("HEALTH_CHECK_WORKERS must be at least 1");
        }

        let max_generation_attempts: usize = parse_or(
            &get,
            "MAX_GENERATION_ATTEMPTS",
            DEFAULT_MAX_GENERATION_ATTEMPTS,
        )?;
        if max_generation_attempts == 0 {
            anyhow::bail!("MAX_GENERATION_ATTEMPTS must be at least 1");
        }

        let interval_secs: u64 = parse_or(&get, "HEALTH_CHECK_INTERVAL_SECS", 5)?;
        if interval_secs == 0 {
            anyhow::bail!("HEALTH_CHECK_INTERVAL_SECS must be at least 1");
        }
        let timeout_secs: u64 = parse_or(&get, "HEALTH_CHECK_TIMEOUT_SECS", 5)?;
        if timeout_secs == 0 {
            anyhow::bail!("HEALTH_CHECK_TIMEOUT_SECS must be at least 1");
        }

        let health_check = HealthCheckConfig {
            worker_count,
            discovery_interval: Duration::from_secs(interval_secs),
            probe_timeout: Duration::from_secs(timeout_secs),
            owned_only: parse_or(&get, "HEALTH_CHECK_OWNED_ONLY", true)?,
        };

        Ok(Self {
            host: get("HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            base_url,
            storage,
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite:./linkcut.db".into()),
            jwt_secret,
            token_ttl: Duration::from_secs(60 * parse_or(&get, "TOKEN_TTL_MINUTES", 100u64)?),
            health_check_enabled: parse_or(&get, "HEALTH_CHECK_ENABLED", true)?,
            health_check,
            max_generation_attempts,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
