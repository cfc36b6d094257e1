//! Daemon configuration.
//!
//! Loads configuration from environment variables with sensible defaults.
//! Everything the reconciler branches on (cutoff date, keyword lists, pool
//! ids) lives here and is passed in at construction; nothing is read from
//! process globals at run time.

use crate::error::{DaemonError, DaemonResult};
use chrono::{DateTime, Utc};
use std::env;
use tally_domain::PoolId;

/// Cutoff the sub-component accounting went live on.
const DEFAULT_CUTOFF_DATE: &str = "2025-07-11T00:00:00-07:00";

// =============================================================================
// Configuration
// =============================================================================

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiConfig,

    /// Order API client configuration
    pub orders: OrdersConfig,

    /// Reconciliation configuration
    pub recon: ReconConfig,

    /// Seconds between reconciliation cycles
    pub sync_interval_secs: u64,

    /// Database URL (memory store is used when absent)
    pub database_url: Option<String>,

    /// Environment (test, development, production)
    pub environment: Environment,
}

/// API server configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
}

/// Order API client configuration.
#[derive(Debug, Clone)]
pub struct OrdersConfig {
    /// Base URL of the order-management API
    pub base_url: String,
    /// Static API key
    pub api_key: String,
    /// Trailing fetch window in days
    pub lookback_days: i64,
    /// Listing page size
    pub page_size: u32,
}

/// Reconciliation engine configuration.
#[derive(Debug, Clone)]
pub struct ReconConfig {
    /// Orders shipped at/after this instant get sub-component allocation
    pub cutoff_date: DateTime<Utc>,
    /// Substring keywords marking doubled-capacity bundle SKUs
    pub bundle_keywords: Vec<String>,
    /// Substring keywords marking SKUs that consume a shared sub-component
    pub subcomponent_keywords: Vec<String>,
    /// Pool drained by the bundled fallback
    pub bundle_pool: PoolId,
    /// Pool the sub-component allocation draws from
    pub subcomponent_pool: PoolId,
    /// Synthetic SKU sub-component sales are logged under
    pub subcomponent_sku: String,
}

/// Environment type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Test environment (memory store, no scheduler)
    Test,
    /// Development environment
    Development,
    /// Production environment
    Production,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> DaemonResult<Self> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let environment = Self::load_environment()?;
        let api = Self::load_api_config()?;
        let orders = Self::load_orders_config()?;
        let recon = Self::load_recon_config()?;
        let sync_interval_secs = Self::load_u64_env("TALLY_SYNC_INTERVAL_SECS", 60)?;
        let database_url = env::var("DATABASE_URL").ok();

        Ok(Self { api, orders, recon, sync_interval_secs, database_url, environment })
    }

    /// Create test configuration.
    pub fn test() -> Self {
        Self {
            api: ApiConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
            },
            orders: OrdersConfig {
                base_url: "http://127.0.0.1:0".to_string(),
                api_key: "test-key".to_string(),
                lookback_days: 7,
                page_size: 100,
            },
            recon: ReconConfig {
                // Epoch cutoff: sub-component allocation always applies.
                cutoff_date: DateTime::UNIX_EPOCH,
                ..ReconConfig::default()
            },
            sync_interval_secs: 60,
            database_url: None,
            environment: Environment::Test,
        }
    }

    fn load_environment() -> DaemonResult<Environment> {
        let env_str = env::var("TALLY_ENV").unwrap_or_else(|_| "development".to_string());

        match env_str.to_lowercase().as_str() {
            "test" => Ok(Environment::Test),
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(DaemonError::Config(format!(
                "Invalid TALLY_ENV: {}. Expected: test, development, production",
                other
            ))),
        }
    }

    fn load_api_config() -> DaemonResult<ApiConfig> {
        let host = env::var("TALLY_API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port_str = env::var("TALLY_API_PORT").unwrap_or_else(|_| "8080".to_string());

        let port = port_str
            .parse::<u16>()
            .map_err(|_| DaemonError::Config(format!("Invalid TALLY_API_PORT: {}", port_str)))?;

        Ok(ApiConfig { host, port })
    }

    fn load_orders_config() -> DaemonResult<OrdersConfig> {
        let base_url = env::var("TALLY_ORDERS_URL")
            .map_err(|_| DaemonError::Config("Missing TALLY_ORDERS_URL in environment".to_string()))?;
        let api_key = env::var("TALLY_ORDERS_API_KEY").map_err(|_| {
            DaemonError::Config("Missing TALLY_ORDERS_API_KEY in environment".to_string())
        })?;
        let lookback_days = Self::load_u64_env("TALLY_LOOKBACK_DAYS", 7)? as i64;
        let page_size = Self::load_u64_env("TALLY_ORDERS_PAGE_SIZE", 100)? as u32;

        Ok(OrdersConfig { base_url, api_key, lookback_days, page_size })
    }

    fn load_recon_config() -> DaemonResult<ReconConfig> {
        let defaults = ReconConfig::default();

        let cutoff_date = Self::load_datetime_env("TALLY_CUTOFF_DATE", defaults.cutoff_date)?;
        let bundle_keywords =
            Self::load_list_env("TALLY_BUNDLE_KEYWORDS", defaults.bundle_keywords);
        let subcomponent_keywords =
            Self::load_list_env("TALLY_SUBCOMPONENT_KEYWORDS", defaults.subcomponent_keywords);
        let bundle_pool = Self::load_u64_env("TALLY_BUNDLE_POOL", defaults.bundle_pool as u64)? as PoolId;
        let subcomponent_pool =
            Self::load_u64_env("TALLY_SUBCOMPONENT_POOL", defaults.subcomponent_pool as u64)? as PoolId;
        let subcomponent_sku = env::var("TALLY_SUBCOMPONENT_SKU")
            .unwrap_or_else(|_| defaults.subcomponent_sku.clone());

        Ok(ReconConfig {
            cutoff_date,
            bundle_keywords,
            subcomponent_keywords,
            bundle_pool,
            subcomponent_pool,
            subcomponent_sku,
        })
    }

    fn load_u64_env(key: &str, default: u64) -> DaemonResult<u64> {
        match env::var(key) {
            Ok(val) => val
                .parse::<u64>()
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_datetime_env(key: &str, default: DateTime<Utc>) -> DaemonResult<DateTime<Utc>> {
        match env::var(key) {
            Ok(val) => DateTime::parse_from_rfc3339(&val)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| DaemonError::Config(format!("Invalid {} value: {}", key, val))),
            Err(_) => Ok(default),
        }
    }

    fn load_list_env(key: &str, default: Vec<String>) -> Vec<String> {
        match env::var(key) {
            Ok(val) => val
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            Err(_) => default,
        }
    }
}

impl Default for ReconConfig {
    fn default() -> Self {
        Self {
            cutoff_date: DateTime::parse_from_rfc3339(DEFAULT_CUTOFF_DATE)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(DateTime::UNIX_EPOCH),
            bundle_keywords: vec!["+512gb".to_string(), "--512gb".to_string()],
            subcomponent_keywords: vec![
                "+1tb".to_string(),
                "--1tb".to_string(),
                "b0d1d5j1j1".to_string(),
            ],
            bundle_pool: 1,
            subcomponent_pool: 2,
            subcomponent_sku: "SSD-1TB".to_string(),
        }
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Test => write!(f, "test"),
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
