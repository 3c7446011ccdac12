//! Configuration loading and representation.
//!
//! Every setting has a default; the `from_env` constructors only override
//! what is set.

use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::orders::counter::{sanitize_prefix, CounterSettings, MAX_COUNTER_PREFIX_LEN};

pub const ENV_DB_URL: &str = "ORDERS_DATABASE_URL";
pub const ENV_DB_MAX_CONNECTIONS: &str = "ORDERS_DB_MAX_CONNECTIONS";
pub const ENV_RECREATE_MODE: &str = "ORDERS_RECREATE_MODE";
pub const ENV_LOCATION_BASE: &str = "ORDERS_LOCATION_BASE";
pub const ENV_SEQUENCE_PREFIX: &str = "ORDERS_SEQUENCE_PREFIX";
pub const ENV_SEQUENCE_MAX: &str = "ORDERS_SEQUENCE_MAX";

/// Endpoint that created orders are located under.
pub const DEFAULT_LOCATION_BASE: &str = "/orders-storage/purchase-orders";

/// How a counter is recreated when an order goes back to `Pending`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecreateMode {
    /// Create the counter in its own unit of work; failures are only logged
    /// and the row update proceeds. A later failed update can leave the
    /// counter behind.
    #[default]
    BestEffort,
    /// Create the counter and update the row in one transaction; any failure
    /// is reported and nothing is kept.
    Strict,
}

impl FromStr for RecreateMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "best_effort" => Ok(RecreateMode::BestEffort),
            "strict" => Ok(RecreateMode::Strict),
            other => anyhow::bail!("unknown recreate mode '{other}' (expected best_effort or strict)"),
        }
    }
}

/// Lifecycle orchestration settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    pub recreate_mode: RecreateMode,
    pub location_base: String,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            recreate_mode: RecreateMode::default(),
            location_base: DEFAULT_LOCATION_BASE.to_string(),
        }
    }
}

impl LifecycleConfig {
    pub fn with_recreate_mode(mut self, mode: RecreateMode) -> Self {
        self.recreate_mode = mode;
        self
    }

    pub fn with_location_base(mut self, base: impl Into<String>) -> Self {
        self.location_base = base.into();
        self
    }

    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(mode) = read_env(ENV_RECREATE_MODE) {
            config.recreate_mode = mode
                .parse()
                .with_context(|| format!("invalid {ENV_RECREATE_MODE}"))?;
        }
        if let Some(base) = read_env(ENV_LOCATION_BASE) {
            config.location_base = base;
        }
        Ok(config)
    }

    /// Location reference of an order created under `id`.
    pub fn location_of(&self, id: impl core::fmt::Display) -> String {
        format!("{}/{}", self.location_base.trim_end_matches('/'), id)
    }
}

impl CounterSettings {
    pub fn from_env() -> Result<Self> {
        let mut settings = Self::default();
        if let Some(prefix) = read_env(ENV_SEQUENCE_PREFIX) {
            settings = settings.with_prefix(checked_prefix(&prefix)?);
        }
        if let Some(max) = read_env(ENV_SEQUENCE_MAX) {
            let max: i64 = max
                .parse()
                .with_context(|| format!("invalid {ENV_SEQUENCE_MAX}"))?;
            settings = settings.with_max_value(max);
        }
        Ok(settings)
    }
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self> {
        let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
        let max_connections = match read_env(ENV_DB_MAX_CONNECTIONS) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid {ENV_DB_MAX_CONNECTIONS}"))?,
            None => 10,
        };
        Ok(Self {
            url,
            max_connections,
        })
    }

    pub async fn connect(&self) -> Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.url)
            .await
            .context("failed to connect to Postgres")
    }
}

/// Sanitized counter prefix, rejected when empty or too long to keep counter
/// names unique.
fn checked_prefix(raw: &str) -> Result<String> {
    let prefix = sanitize_prefix(raw);
    anyhow::ensure!(
        !prefix.is_empty(),
        "{ENV_SEQUENCE_PREFIX} has no usable characters"
    );
    anyhow::ensure!(
        prefix.len() <= MAX_COUNTER_PREFIX_LEN,
        "{ENV_SEQUENCE_PREFIX} is {} characters; at most {MAX_COUNTER_PREFIX_LEN} fit",
        prefix.len()
    );
    Ok(prefix)
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
