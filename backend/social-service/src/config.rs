/// Configuration management for Social Service
///
/// Loads configuration from environment variables.
use anyhow::{bail, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Store backend selection
    pub store: StoreConfig,
    /// Feed and visibility tuning
    pub feed: FeedConfig,
    /// Background jobs
    pub jobs: JobsConfig,
}

/// Application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application environment (dev, staging, prod)
    pub env: String,
    /// Server host to bind to
    pub host: String,
    /// HTTP port
    pub http_port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Only present for the postgres backend
    pub database: Option<DatabaseConfig>,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database URL
    pub url: String,
    /// Max connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Min connections in pool
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Maximum items on the explore feed
    pub explore_page_size: usize,
    /// Lifetime of a story
    pub story_ttl_hours: i64,
    /// `last_active` recency that counts as online
    pub online_window_minutes: i64,
    /// Maximum account search results
    pub search_limit: usize,
}

impl FeedConfig {
    pub fn story_ttl(&self) -> Duration {
        Duration::hours(self.story_ttl_hours)
    }

    pub fn online_window(&self) -> Duration {
        Duration::minutes(self.online_window_minutes)
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            explore_page_size: 30,
            story_ttl_hours: 24,
            online_window_minutes: 5,
            search_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    pub story_sweep_enabled: bool,
    pub story_sweep_interval_secs: u64,
}

// Default values
fn default_max_connections() -> u32 {
    20
}

fn default_min_connections() -> u32 {
    5
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let app = AppConfig {
            env: get("APP_ENV").unwrap_or_else(|| "development".to_string()),
            host: get("APP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            http_port: parse_or(get("PORT"), 8006), // social-service default HTTP port
        };

        let database_url = get("DATABASE_URL").filter(|url| !url.is_empty());
        let backend = match get("STORE_BACKEND").as_deref() {
            Some("memory") => StoreBackend::Memory,
            Some("postgres") => StoreBackend::Postgres,
            Some(other) => bail!("unknown STORE_BACKEND '{}'", other),
            None if database_url.is_some() => StoreBackend::Postgres,
            None => StoreBackend::Memory,
        };

        let database = match (backend, database_url) {
            (StoreBackend::Postgres, None) => {
                bail!("STORE_BACKEND=postgres requires DATABASE_URL")
            }
            (StoreBackend::Postgres, Some(url)) => Some(DatabaseConfig {
                url,
                max_connections: parse_or(get("DB_MAX_CONNECTIONS"), default_max_connections()),
                min_connections: parse_or(get("DB_MIN_CONNECTIONS"), default_min_connections()),
            }),
            (StoreBackend::Memory, _) => None,
        };

        let defaults = FeedConfig::default();
        let feed = FeedConfig {
            explore_page_size: parse_or(get("EXPLORE_PAGE_SIZE"), defaults.explore_page_size),
            story_ttl_hours: parse_or(get("STORY_TTL_HOURS"), defaults.story_ttl_hours),
            online_window_minutes: parse_or(
                get("ONLINE_WINDOW_MINUTES"),
                defaults.online_window_minutes,
            ),
            search_limit: parse_or(get("SEARCH_LIMIT"), defaults.search_limit),
        };

        let jobs = JobsConfig {
            story_sweep_enabled: parse_or(get("STORY_SWEEP_ENABLED"), true),
            story_sweep_interval_secs: parse_or(get("STORY_SWEEP_INTERVAL_SECS"), 300),
        };

        Ok(Config {
            app,
            store: StoreConfig { backend, database },
            feed,
            jobs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = load(&[]).unwrap();

        assert_eq!(config.app.env, "development");
        assert_eq!(config.app.host, "0.0.0.0");
        assert_eq!(config.app.http_port, 8006);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.feed.explore_page_size, 30);
        assert_eq!(config.feed.story_ttl(), Duration::hours(24));
        assert_eq!(config.feed.online_window(), Duration::minutes(5));
        assert!(config.jobs.story_sweep_enabled);
    }

    #[test]
    fn database_url_selects_postgres() {
        let config = load(&[("DATABASE_URL", "postgres://test")]).unwrap();
        let database = config.store.database.unwrap();

        assert_eq!(config.store.backend, StoreBackend::Postgres);
        assert_eq!(database.max_connections, 20);
        assert_eq!(database.min_connections, 5);
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = load(&[("PORT", "abc"), ("EXPLORE_PAGE_SIZE", "-3")]).unwrap();
        assert_eq!(config.app.http_port, 8006);
        assert_eq!(config.feed.explore_page_size, 30);
    }

    #[test]
    fn postgres_without_url_is_rejected() {
        assert!(load(&[("STORE_BACKEND", "postgres")]).is_err());
        assert!(load(&[("STORE_BACKEND", "redis")]).is_err());
    }
}
