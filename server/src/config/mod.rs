use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use tracing::{info, warn};

use crate::stats::DEFAULT_STATS_INTERVAL;
use crate::ticketing::DEFAULT_SEARCH_LIMIT;

pub mod cors;
pub mod security;

pub use cors::{create_cors_layer, parse_origins, DEFAULT_ALLOWED_ORIGINS};
pub use security::create_security_headers_layer;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/ikou";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub store_backend: StoreBackend,
    pub max_connections: u32,
    pub search_limit: i64,
    pub stats_interval: Duration,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            port: 3001,
            store_backend: StoreBackend::Postgres,
            max_connections: 5,
            search_limit: DEFAULT_SEARCH_LIMIT,
            stats_interval: DEFAULT_STATS_INTERVAL,
            cors_allowed_origins: parse_origins(DEFAULT_ALLOWED_ORIGINS),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            port: parse_var("IKOU_PORT", defaults.port),
            store_backend: parse_var("IKOU_STORE", defaults.store_backend),
            max_connections: parse_var("IKOU_DB_MAX_CONNECTIONS", defaults.max_connections),
            search_limit: parse_var("IKOU_SEARCH_LIMIT", defaults.search_limit).max(1),
            stats_interval: Duration::from_secs(
                parse_var("IKOU_STATS_INTERVAL_SECS", defaults.stats_interval.as_secs()).max(1),
            ),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS")
                .map(|raw| parse_origins(&raw))
                .unwrap_or(defaults.cors_allowed_origins),
        }
    }
}

fn parse_var<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|e| {
            warn!("Invalid {key} value '{raw}': {e}, using default {default:?}");
            default
        }),
        Err(_) => {
            info!("{key} not set, using default: {default:?}");
            default
        }
    }
}
