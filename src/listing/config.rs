//! Configuration for the listing governor, the response cache and the server.

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Tuning for the client-side request governor.
#[derive(Debug, Clone)]
pub struct GovernorConfig {
    /// Minimum gap between consecutive dispatches
    pub min_delay: Duration,
    /// How long a successful result stays in the local cache
    pub cache_ttl: Duration,
    /// Queued requests older than this are rejected instead of dispatched
    pub max_queue_age: Duration,
    /// Per-attempt timeout for the upstream call
    pub request_timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: usize,
    /// Backoff before retry `n` is `backoff_base * 2^n` plus jitter
    pub backoff_base: Duration,
    /// Upper bound of the random jitter added to each backoff
    pub max_jitter: Duration,
    /// Maximum number of cached results
    pub cache_capacity: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            // 120 requests/minute upstream, kept safely below
            min_delay: Duration::from_millis(600),
            cache_ttl: Duration::from_secs(30),
            max_queue_age: Duration::from_secs(30),
            request_timeout: Duration::from_secs(40),
            max_retries: 2,
            backoff_base: Duration::from_secs(1),
            max_jitter: Duration::from_secs(1),
            cache_capacity: 10_000,
        }
    }
}

/// Tuning for the server-side response cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub default_ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(10 * 60),
            sweep_interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Server process configuration, read from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Base URL of the marketplace API
    pub marketplace_api_url: String,
    pub cache: CacheConfig,
    pub upstream_requests_per_minute: u32,
    pub upstream_timeout: Duration,
    /// Overall deadline for one price-summary batch
    pub price_summary_timeout: Duration,
}

impl ServerConfig {
    const DEFAULT_HOST: &'static str = "0.0.0.0";
    const DEFAULT_PORT: u16 = 8080;
    const DEFAULT_MARKETPLACE_API_URL: &'static str = "https://api-mainnet.magiceden.dev/v2";
    const DEFAULT_REQUESTS_PER_MINUTE: u32 = 120;

    pub fn from_env() -> Self {
        let defaults = CacheConfig::default();
        Self {
            host: std::env::var("LISTING_HOST").unwrap_or_else(|_| Self::DEFAULT_HOST.to_string()),
            port: env_or("LISTING_PORT", Self::DEFAULT_PORT),
            marketplace_api_url: std::env::var("MAGIC_EDEN_API_URL")
                .unwrap_or_else(|_| Self::DEFAULT_MARKETPLACE_API_URL.to_string()),
            cache: CacheConfig {
                default_ttl: Duration::from_secs(env_or(
                    "LISTING_CACHE_TTL_SECS",
                    defaults.default_ttl.as_secs(),
                )),
                sweep_interval: Duration::from_secs(env_or(
                    "LISTING_SWEEP_INTERVAL_SECS",
                    defaults.sweep_interval.as_secs(),
                )),
            },
            upstream_requests_per_minute: env_or(
                "UPSTREAM_REQUESTS_PER_MINUTE",
                Self::DEFAULT_REQUESTS_PER_MINUTE,
            ),
            upstream_timeout: Duration::from_secs(env_or("UPSTREAM_TIMEOUT_SECS", 30)),
            price_summary_timeout: Duration::from_secs(env_or("PRICE_SUMMARY_TIMEOUT_SECS", 10)),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse an environment variable, falling back to `default` when it is unset
/// or malformed.
fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

/// Builder for [`GovernorConfig`] with sensible defaults.
pub struct GovernorBuilder {
    config: GovernorConfig,
}

impl GovernorBuilder {
    pub fn new() -> Self {
        Self {
            config: GovernorConfig::default(),
        }
    }

    /// Set the minimum gap between dispatches.
    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.config.min_delay = min_delay;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache_ttl = ttl;
        self
    }

    pub fn with_max_queue_age(mut self, age: Duration) -> Self {
        self.config.max_queue_age = age;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Set retry count and backoff base.
    pub fn with_retries(mut self, max_retries: usize, backoff_base: Duration) -> Self {
        self.config.max_retries = max_retries;
        self.config.backoff_base = backoff_base;
        self
    }

    pub fn with_max_jitter(mut self, jitter: Duration) -> Self {
        self.config.max_jitter = jitter;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    pub fn build_config(self) -> GovernorConfig {
        self.config
    }
}

impl Default for GovernorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_governor_defaults() {
        let config = GovernorBuilder::new().build_config();

        assert_eq!(config.min_delay, Duration::from_millis(600));
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.max_queue_age, Duration::from_secs(30));
        assert_eq!(config.request_timeout, Duration::from_secs(40));
        assert_eq!(config.max_retries, 2);
    }

    #[test]
    fn test_governor_builder() {
        let config = GovernorBuilder::new()
            .with_min_delay(Duration::from_millis(250))
            .with_retries(5, Duration::from_millis(100))
            .with_cache_capacity(16)
            .build_config();

        assert_eq!(config.min_delay, Duration::from_millis(250));
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.backoff_base, Duration::from_millis(100));
        assert_eq!(config.cache_capacity, 16);
    }

    #[test]
    fn test_cache_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl, Duration::from_secs(600));
        assert_eq!(config.sweep_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("NFT_LISTING_TEST_PORT", "not-a-port");
        assert_eq!(env_or("NFT_LISTING_TEST_PORT", 8080u16), 8080);
        std::env::set_var("NFT_LISTING_TEST_PORT", " 9090 ");
        assert_eq!(env_or("NFT_LISTING_TEST_PORT", 8080u16), 9090);
        std::env::remove_var("NFT_LISTING_TEST_PORT");
        assert_eq!(env_or("NFT_LISTING_TEST_PORT", 7u16), 7);
    }
}
