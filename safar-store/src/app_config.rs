use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub expiry: ExpiryConfig,
    #[serde(default)]
    pub seating: SeatingConfig,
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub revalidation: RevalidationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Transactional tier. `None` skips straight to the key-value tier.
    pub database_url: Option<String>,
    /// Key-value tier. `None` keeps the key-value tier in process memory.
    pub redis_url: Option<String>,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            database_url: None,
            redis_url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExpiryConfig {
    #[serde(default = "default_day")]
    pub city_ttl_seconds: u64,
    #[serde(default = "default_day")]
    pub return_route_ttl_seconds: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            city_ttl_seconds: default_day(),
            return_route_ttl_seconds: default_day(),
        }
    }
}

/// Upper bound for configured TTLs (one hundred years).
const MAX_TTL_SECONDS: u64 = 100 * 365 * 24 * 60 * 60;

impl ExpiryConfig {
    pub fn city_ttl(&self) -> chrono::Duration {
        ttl_from_seconds(self.city_ttl_seconds)
    }

    pub fn return_route_ttl(&self) -> chrono::Duration {
        ttl_from_seconds(self.return_route_ttl_seconds)
    }
}

fn ttl_from_seconds(seconds: u64) -> chrono::Duration {
    chrono::Duration::seconds(seconds.min(MAX_TTL_SECONDS) as i64)
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeatingConfig {
    #[serde(default = "default_max_selectable")]
    pub max_selectable: usize,
}

impl Default for SeatingConfig {
    fn default() -> Self {
        Self {
            max_selectable: default_max_selectable(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NavigationConfig {
    #[serde(default = "default_guard_timeout")]
    pub guard_timeout_seconds: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            guard_timeout_seconds: default_guard_timeout(),
        }
    }
}

impl NavigationConfig {
    pub fn guard_timeout(&self) -> Duration {
        Duration::from_secs(self.guard_timeout_seconds)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RevalidationConfig {
    #[serde(default = "default_city_interval")]
    pub city_interval_seconds: u64,
    #[serde(default = "default_route_interval")]
    pub route_interval_seconds: u64,
}

impl Default for RevalidationConfig {
    fn default() -> Self {
        Self {
            city_interval_seconds: default_city_interval(),
            route_interval_seconds: default_route_interval(),
        }
    }
}

impl RevalidationConfig {
    pub fn city_interval(&self) -> Duration {
        Duration::from_secs(self.city_interval_seconds.max(1))
    }

    pub fn route_interval(&self) -> Duration {
        Duration::from_secs(self.route_interval_seconds.max(1))
    }
}

fn default_namespace() -> String { "safar".to_string() }
fn default_day() -> u64 { 24 * 60 * 60 }
fn default_max_selectable() -> usize { 4 }
fn default_guard_timeout() -> u64 { 20 }
fn default_city_interval() -> u64 { 10 }
fn default_route_interval() -> u64 { 60 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides are optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg.. `SAFAR_SEATING__MAX_SELECTABLE=6`
            .add_source(config::Environment::with_prefix("SAFAR").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
