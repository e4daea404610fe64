//! Coordinator configuration.
//!
//! Values come from `LOOP_*` environment variables; a YAML file named by
//! `LOOP_CONFIG` may override any of them.
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;

pub const DEFAULT_BIND: &str = "0.0.0.0:8084";
pub const DEFAULT_METRICS_BIND: &str = "0.0.0.0:9084";
pub const DEFAULT_OTP_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;
pub const DEFAULT_PG_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_PG_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "postgres" | "pg" => Ok(Self::Postgres),
            other => bail!("unknown storage backend {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub storage: StorageBackend,
    pub postgres: Option<PostgresConfig>,
    pub otp_ttl_secs: u64,
    pub session_ttl_secs: u64,
}

#[derive(Debug, Default, Deserialize)]
struct CoordinatorConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    storage: Option<StorageBackend>,
    postgres_url: Option<String>,
    postgres_max_connections: Option<u32>,
    postgres_acquire_timeout_ms: Option<u64>,
    otp_ttl_secs: Option<u64>,
    session_ttl_secs: Option<u64>,
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|err| anyhow::anyhow!("parse {key}: {err}")),
        Err(_) => Ok(default),
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Result<Self> {
        let bind_addr = std::env::var("LOOP_BIND")
            .unwrap_or_else(|_| DEFAULT_BIND.to_string())
            .parse()
            .with_context(|| "parse LOOP_BIND")?;
        let metrics_bind = std::env::var("LOOP_METRICS_BIND")
            .unwrap_or_else(|_| DEFAULT_METRICS_BIND.to_string())
            .parse()
            .with_context(|| "parse LOOP_METRICS_BIND")?;
        let storage = env_parse("LOOP_STORAGE", StorageBackend::Memory)?;
        let max_connections = env_parse("LOOP_PG_MAX_CONNECTIONS", DEFAULT_PG_MAX_CONNECTIONS)?;
        let acquire_timeout_ms =
            env_parse("LOOP_PG_ACQUIRE_TIMEOUT_MS", DEFAULT_PG_ACQUIRE_TIMEOUT_MS)?;
        let postgres = std::env::var("LOOP_PG_URL").ok().map(|url| PostgresConfig {
            url,
            max_connections,
            acquire_timeout_ms,
        });
        Ok(Self {
            bind_addr,
            metrics_bind,
            storage,
            postgres,
            otp_ttl_secs: env_parse("LOOP_OTP_TTL_SECS", DEFAULT_OTP_TTL_SECS)?,
            session_ttl_secs: env_parse("LOOP_SESSION_TTL_SECS", DEFAULT_SESSION_TTL_SECS)?,
        })
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("LOOP_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read LOOP_CONFIG: {path}"))?;
            let override_cfg: CoordinatorConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse coordinator config yaml")?;
            config.apply(override_cfg)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, override_cfg: CoordinatorConfigOverride) -> Result<()> {
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.storage {
            self.storage = value;
        }
        if let Some(url) = override_cfg.postgres_url {
            let pg = self.postgres.get_or_insert_with(|| PostgresConfig {
                url: String::new(),
                max_connections: DEFAULT_PG_MAX_CONNECTIONS,
                acquire_timeout_ms: DEFAULT_PG_ACQUIRE_TIMEOUT_MS,
            });
            pg.url = url;
        }
        if let Some(pg) = self.postgres.as_mut() {
            if let Some(value) = override_cfg.postgres_max_connections {
                pg.max_connections = value;
            }
            if let Some(value) = override_cfg.postgres_acquire_timeout_ms {
                pg.acquire_timeout_ms = value;
            }
        }
        if let Some(value) = override_cfg.otp_ttl_secs {
            self.otp_ttl_secs = value;
        }
        if let Some(value) = override_cfg.session_ttl_secs {
            self.session_ttl_secs = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage == StorageBackend::Postgres && self.postgres.is_none() {
            bail!("postgres storage selected but LOOP_PG_URL is not set");
        }
        if self.otp_ttl_secs == 0 || self.session_ttl_secs == 0 {
            bail!("credential lifetimes must be positive");
        }
        Ok(())
    }

    pub fn credential_policy(&self) -> loop_authz::CredentialPolicy {
        loop_authz::CredentialPolicy {
            one_time_code_ttl: chrono::Duration::seconds(self.otp_ttl_secs as i64),
            session_ttl: chrono::Duration::seconds(self.session_ttl_secs as i64),
        }
    }
}
