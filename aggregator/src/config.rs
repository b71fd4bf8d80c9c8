use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Environment variable consulted when the config file carries no API key.
pub const API_KEY_ENV: &str = "UPSTREAM_API_KEY";

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("No upstream API key configured (set upstream.api_key or {API_KEY_ENV})")]
    MissingApiKey,

    #[error("{0} must be greater than 0")]
    NonPositive(&'static str),

    #[error("Store path cannot be empty")]
    EmptyStorePath,
}

#[derive(Clone, Default, Deserialize, Debug, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub listener: Listener,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.upstream.validate()?;
        self.store.validate()?;
        self.cache.validate()?;
        Ok(())
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
pub struct Listener {
    pub host: String,
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: Url,
    /// Sent verbatim as the Authorization header.
    pub api_key: Option<String>,
    /// Budget for a single group of concurrent upstream calls.
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            base_url: Url::parse("https://api.henrikdev.xyz").expect("static URL is valid"),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl UpstreamConfig {
    /// The configured key, falling back to the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok())
            .filter(|key| !key.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.timeout_secs == 0 {
            return Err(ValidationError::NonPositive("upstream.timeout_secs"));
        }
        if self.resolve_api_key().is_none() {
            return Err(ValidationError::MissingApiKey);
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub max_connections: u32,
    /// Maximum rows per multi-row insert statement.
    pub batch_size: usize,
    pub busy_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: PathBuf::from("data/tracker.db"),
            max_connections: 8,
            batch_size: 100,
            busy_timeout_secs: 5,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.path.as_os_str().is_empty() {
            return Err(ValidationError::EmptyStorePath);
        }
        if self.max_connections == 0 {
            return Err(ValidationError::NonPositive("store.max_connections"));
        }
        if self.batch_size == 0 {
            return Err(ValidationError::NonPositive("store.batch_size"));
        }
        Ok(())
    }
}

#[derive(Clone, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    pub player_ttl_secs: u64,
    pub match_ttl_secs: u64,
    /// Delay between a successful refresh and its last-fetch stamp.
    pub settle_delay_secs: u64,
    pub request_timeout_secs: u64,
    pub negative_ttl_secs: u64,
    pub max_search_limit: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            player_ttl_secs: 300,
            match_ttl_secs: 300,
            settle_delay_secs: 10,
            request_timeout_secs: 30,
            negative_ttl_secs: 60,
            max_search_limit: 10,
        }
    }
}

impl CacheConfig {
    pub fn player_ttl(&self) -> Duration {
        Duration::from_secs(self.player_ttl_secs)
    }

    pub fn match_ttl(&self) -> Duration {
        Duration::from_secs(self.match_ttl_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.negative_ttl_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.request_timeout_secs == 0 {
            return Err(ValidationError::NonPositive("cache.request_timeout_secs"));
        }
        if self.negative_ttl_secs == 0 {
            return Err(ValidationError::NonPositive("cache.negative_ttl_secs"));
        }
        if self.max_search_limit == 0 {
            return Err(ValidationError::NonPositive("cache.max_search_limit"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
listener:
    host: "0.0.0.0"
    port: 8080
upstream:
    base_url: "http://127.0.0.1:9000"
    api_key: "HDEV-test"
    timeout_secs: 3
store:
    path: /var/lib/tracker/tracker.db
    batch_size: 50
cache:
    player_ttl_secs: 120
    settle_delay_secs: 2
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.listener.port, 8080);
        assert_eq!(config.upstream.base_url.as_str(), "http://127.0.0.1:9000/");
        assert_eq!(config.upstream.timeout(), Duration::from_secs(3));
        assert_eq!(config.store.batch_size, 50);
        // Unset keys keep their defaults
        assert_eq!(config.store.max_connections, 8);
        assert_eq!(config.cache.player_ttl(), Duration::from_secs(120));
        assert_eq!(config.cache.match_ttl(), Duration::from_secs(300));
        assert_eq!(config.cache.settle_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_values() {
        let mut config: Config = serde_yaml::from_str("upstream:\n    api_key: key\n").unwrap();
        assert!(config.validate().is_ok());

        config.listener.port = 0;
        assert_eq!(config.validate(), Err(ValidationError::InvalidPort));
        config.listener.port = 3000;

        config.store.batch_size = 0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::NonPositive("store.batch_size"))
        );
        config.store.batch_size = 100;

        config.cache.max_search_limit = 0;
        assert_eq!(
            config.validate(),
            Err(ValidationError::NonPositive("cache.max_search_limit"))
        );
    }

    #[test]
    fn test_invalid_url_rejected() {
        let result: Result<Config, _> = serde_yaml::from_str("upstream:\n    base_url: not a url\n");
        assert!(result.is_err());
    }
}
