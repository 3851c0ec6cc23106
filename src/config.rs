use std::{env, str::FromStr};

use anyhow::{Context, Result, bail};
use chrono::FixedOffset;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    MySql,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(StoreBackend::MySql),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("unknown store backend '{}', expected mysql or memory", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_addr: String,
    pub jwt_secret: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    /// JSON fixture of members, clients and sites for the memory backend.
    pub memory_seed_file: Option<String>,
    pub run_migrations: bool,

    // Rate limiting
    pub rate_protected_per_min: u32,
    pub rate_analytics_per_min: u32,

    pub api_prefix: String,

    /// Fixed offset applied before turning timestamps into report dates.
    pub report_utc_offset_minutes: i32,
    pub punch_out_completes: bool,
    pub member_name_cache_ttl_secs: u64,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{} must be set", key))
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let store_backend = parsed_or("STORE_BACKEND", StoreBackend::MySql)?;
        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::MySql && database_url.is_none() {
            bail!("DATABASE_URL must be set when STORE_BACKEND=mysql");
        }

        let config = Self {
            server_addr: required("SERVER_ADDR")?,
            jwt_secret: required("JWT_SECRET")?,
            store_backend,
            database_url,
            memory_seed_file: env::var("MEMORY_SEED_FILE").ok(),
            run_migrations: parsed_or("RUN_MIGRATIONS", false)?,
            rate_protected_per_min: parsed_or("RATE_PROTECTED_PER_MIN", 1000)?,
            rate_analytics_per_min: parsed_or("RATE_ANALYTICS_PER_MIN", 120)?,
            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            report_utc_offset_minutes: parsed_or("REPORT_UTC_OFFSET_MINUTES", 0)?,
            punch_out_completes: parsed_or("PUNCH_OUT_COMPLETES", true)?,
            member_name_cache_ttl_secs: parsed_or("MEMBER_NAME_CACHE_TTL_SECS", 3600)?,
        };
        config.report_offset()?;
        Ok(config)
    }

    pub fn report_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.report_utc_offset_minutes * 60).with_context(|| {
            format!(
                "REPORT_UTC_OFFSET_MINUTES out of range: {}",
                self.report_utc_offset_minutes
            )
        })
    }
}
