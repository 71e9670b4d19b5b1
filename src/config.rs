use std::fmt;
use std::time::Duration;

use crate::errors::ScreenError;

pub const DEFAULT_BASE_URL: &str = "https://api.chainalysis.com";

/// Run configuration for a screening session.
///
/// Loaded once and read-only afterward. `Debug` never prints the API key.
#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub base_url: String,
    /// Requests per second across the whole batch.
    pub rate_limit: u32,
    pub max_concurrent_requests: usize,
    /// Total attempts per call, including the first one.
    pub max_retries: u32,
    pub retry_min_backoff: Duration,
    pub retry_max_backoff: Duration,
    pub request_timeout: Duration,
    pub include_indirect_exposure: bool,
}

impl Config {
    /// Builds a configuration with default limits for the given credentials.
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            rate_limit: 5,
            max_concurrent_requests: 10,
            max_retries: 3,
            retry_min_backoff: Duration::from_secs(1),
            retry_max_backoff: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            include_indirect_exposure: true,
        }
    }

    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let api_key = std::env::var("CHAINALYSIS_API_KEY")
            .map_err(|_| anyhow::anyhow!("CHAINALYSIS_API_KEY environment variable is required"))
            .and_then(|key| {
                if key.trim().is_empty() {
                    anyhow::bail!("CHAINALYSIS_API_KEY cannot be empty");
                }
                Ok(key)
            })?;
        let base_url = std::env::var("CHAINALYSIS_BASE_URL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let mut config = Self::new(api_key, base_url);
        config.rate_limit = env_or("RATE_LIMIT", config.rate_limit)?;
        config.max_concurrent_requests =
            env_or("MAX_CONCURRENT_REQUESTS", config.max_concurrent_requests)?;
        config.max_retries = env_or("MAX_RETRIES", config.max_retries)?;
        config.retry_min_backoff = Duration::from_millis(env_or(
            "RETRY_MIN_BACKOFF_MS",
            config.retry_min_backoff.as_millis() as u64,
        )?);
        config.retry_max_backoff = Duration::from_millis(env_or(
            "RETRY_MAX_BACKOFF_MS",
            config.retry_max_backoff.as_millis() as u64,
        )?);
        config.request_timeout = Duration::from_secs(env_or(
            "REQUEST_TIMEOUT_SECS",
            config.request_timeout.as_secs(),
        )?);
        if let Ok(raw) = std::env::var("INCLUDE_INDIRECT_EXPOSURE") {
            config.include_indirect_exposure = parse_flag(&raw);
        }

        config.validate()?;

        // Log successful configuration load (without sensitive values)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!("Base URL: {}", config.base_url);
        tracing::debug!(
            "Rate limit: {} req/s, max concurrent: {}, max attempts: {}",
            config.rate_limit,
            config.max_concurrent_requests,
            config.max_retries
        );

        Ok(config)
    }

    /// Checks the invariants the gate and orchestrator rely on.
    pub fn validate(&self) -> Result<(), ScreenError> {
        if self.api_key.trim().is_empty() {
            return Err(ScreenError::Config("API key cannot be empty".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(ScreenError::Config(
                "base URL must start with http:// or https://".to_string(),
            ));
        }
        if self.rate_limit == 0 {
            return Err(ScreenError::Config("RATE_LIMIT must be at least 1".to_string()));
        }
        if self.max_concurrent_requests == 0 {
            return Err(ScreenError::Config(
                "MAX_CONCURRENT_REQUESTS must be at least 1".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ScreenError::Config("MAX_RETRIES must be at least 1".to_string()));
        }
        if self.retry_min_backoff > self.retry_max_backoff {
            return Err(ScreenError::Config(
                "RETRY_MIN_BACKOFF_MS cannot exceed RETRY_MAX_BACKOFF_MS".to_string(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(ScreenError::Config(
                "REQUEST_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.rate_limit)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("max_retries", &self.max_retries)
            .field("retry_min_backoff", &self.retry_min_backoff)
            .field("retry_max_backoff", &self.retry_max_backoff)
            .field("request_timeout", &self.request_timeout)
            .field("include_indirect_exposure", &self.include_indirect_exposure)
            .finish()
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} must be a valid number, got '{}'", name, raw)),
        _ => Ok(default),
    }
}

/// Only a case-insensitive `true` enables a flag.
pub fn parse_flag(raw: &str) -> bool {
    raw.trim().eq_ignore_ascii_case("true")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new("key", DEFAULT_BASE_URL);
        assert_eq!(config.rate_limit, 5);
        assert_eq!(config.max_concurrent_requests, 10);
        assert_eq!(config.max_retries, 3);
        assert!(config.include_indirect_exposure);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let config = Config::new("super-secret", DEFAULT_BASE_URL);
        let printed = format!("{:?}", config);
        assert!(!printed.contains("super-secret"));
        assert!(printed.contains("[REDACTED]"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::new("  ", DEFAULT_BASE_URL);
        assert!(matches!(config.validate(), Err(ScreenError::Config(_))));

        config.api_key = "key".to_string();
        config.base_url = "ftp://example.com".to_string();
        assert!(config.validate().is_err());

        config.base_url = DEFAULT_BASE_URL.to_string();
        config.rate_limit = 0;
        assert!(config.validate().is_err());

        config.rate_limit = 5;
        config.retry_min_backoff = Duration::from_secs(20);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" True "));
        assert!(!parse_flag("false"));
        assert!(!parse_flag("1"));
        assert!(!parse_flag(""));
    }
}
