//! Configuration types for trackcast

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, net::SocketAddr, path::Path, path::PathBuf, time::Duration};

/// Main configuration
///
/// Loaded from TOML with one table per sub-config:
///
/// ```toml
/// user_agent = "trackcast/0.1"
///
/// [[feeds]]
/// name = "some-artist"
/// url = "https://media.example/artist/some-artist"
///
/// [cache]
/// cache_dir = "/var/cache/trackcast"
/// max_concurrent_downloads = 6
///
/// [server]
/// bind_address = "0.0.0.0:8080"
/// public_url = "http://podcasts.lan:8080"
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Feeds served under `/feeds/{name}`
    #[serde(default)]
    pub feeds: Vec<FeedConfig>,

    /// Media cache and download behavior
    #[serde(default)]
    pub cache: CacheConfig,

    /// Retry policy for opening upstream media connections
    #[serde(default)]
    pub retry: RetryConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// User-Agent sent to upstream
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feeds: vec![],
            cache: CacheConfig::default(),
            retry: RetryConfig::default(),
            server: ServerConfig::default(),
            user_agent: default_user_agent(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text and validate it
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).map_err(|e| Error::Config {
            message: e.to_string(),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("cannot read {}: {}", path.display(), e),
            key: None,
        })?;
        Self::from_toml_str(&text)
    }

    /// Look up a configured feed by name
    pub fn feed(&self, name: &str) -> Option<&FeedConfig> {
        self.feeds.iter().find(|f| f.name == name)
    }

    /// Check cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.cache.max_concurrent_downloads == 0 {
            return Err(Error::Config {
                message: "max_concurrent_downloads must be at least 1".into(),
                key: Some("cache.max_concurrent_downloads".into()),
            });
        }

        if self.cache.read_timeout.is_zero() {
            return Err(Error::Config {
                message: "read_timeout must be at least 1 second".into(),
                key: Some("cache.read_timeout".into()),
            });
        }

        let multiplier = self.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::Config {
                message: format!(
                    "backoff_multiplier must be a finite number >= 1.0, got {multiplier}"
                ),
                key: Some("retry.backoff_multiplier".into()),
            });
        }

        match url::Url::parse(&self.server.public_url) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => {}
            _ => {
                return Err(Error::Config {
                    message: format!(
                        "public_url must be an absolute http(s) URL, got {:?}",
                        self.server.public_url
                    ),
                    key: Some("server.public_url".into()),
                });
            }
        }

        let mut names = HashSet::new();
        for feed in &self.feeds {
            let valid_name = !feed.name.is_empty()
                && feed
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid_name {
                return Err(Error::Config {
                    message: format!(
                        "feed name {:?} must be non-empty and use only [A-Za-z0-9_-]",
                        feed.name
                    ),
                    key: Some("feeds.name".into()),
                });
            }
            if !names.insert(feed.name.as_str()) {
                return Err(Error::Config {
                    message: format!("feed name {:?} is configured twice", feed.name),
                    key: Some("feeds.name".into()),
                });
            }
            match url::Url::parse(&feed.url) {
                Ok(u) if matches!(u.scheme(), "http" | "https") => {}
                _ => {
                    return Err(Error::Config {
                        message: format!("feed {:?} has an invalid url {:?}", feed.name, feed.url),
                        key: Some("feeds.url".into()),
                    });
                }
            }
        }

        Ok(())
    }
}

/// A feed to republish
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    /// Short name used in the `/feeds/{name}` route
    pub name: String,

    /// Upstream artist/channel page
    pub url: String,
}

/// Media cache and download behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding one file per track (default: "./cache")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Maximum concurrent track downloads (default: 4)
    ///
    /// Upstream throttles each connection after an initial burst, so several
    /// parallel downloads are needed to keep overall throughput up.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Timeout for establishing an upstream connection (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Maximum silence between two received chunks before a fetch fails (default: 60 seconds)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// Start downloading every track as soon as its feed is rendered (default: true)
    #[serde(default = "default_true")]
    pub prefetch_on_render: bool,

    /// Minimum interval between progress events for one track (default: 1000 ms)
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            max_concurrent_downloads: default_max_concurrent(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            prefetch_on_render: true,
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// HTTP server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Base URL podcast clients use to reach this server (default: "http://127.0.0.1:8080")
    ///
    /// Enclosure URLs in rendered feeds are built from it.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Seconds advertised in `Retry-After` while media is not yet on disk (default: 5)
    #[serde(default = "default_retry_after_secs")]
    pub retry_after_secs: u64,

    /// Serve `/feed?url=` for pages that are not configured (default: true)
    #[serde(default = "default_true")]
    pub allow_arbitrary_feeds: bool,

    /// Enable CORS (default: false)
    #[serde(default)]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Serve Swagger UI at /swagger-ui (default: false)
    #[serde(default)]
    pub swagger_ui: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            public_url: default_public_url(),
            retry_after_secs: default_retry_after_secs(),
            allow_arbitrary_feeds: true,
            cors_enabled: false,
            cors_origins: default_cors_origins(),
            swagger_ui: false,
        }
    }
}

fn default_user_agent() -> String {
    format!("trackcast/{}", env!("CARGO_PKG_VERSION"))
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

fn default_max_concurrent() -> usize {
    4
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_progress_interval_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_public_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_retry_after_secs() -> u64 {
    5
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".to_string()]
}

// Durations are written as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();

        assert!(config.feeds.is_empty());
        assert_eq!(config.cache.cache_dir, PathBuf::from("cache"));
        assert_eq!(config.cache.max_concurrent_downloads, 4);
        assert_eq!(config.cache.read_timeout, Duration::from_secs(60));
        assert!(config.cache.prefetch_on_render);
        assert_eq!(config.server.bind_address.port(), 8080);
        assert_eq!(config.server.retry_after_secs, 5);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.user_agent.starts_with("trackcast/"));
    }

    #[test]
    fn full_toml_is_parsed() {
        let text = r#"
            user_agent = "custom-agent"

            [[feeds]]
            name = "artist-one"
            url = "https://media.example/artist/one"

            [[feeds]]
            name = "artist_two"
            url = "https://media.example/artist/two"

            [cache]
            cache_dir = "/tmp/tc"
            max_concurrent_downloads = 8
            read_timeout = 15
            prefetch_on_render = false

            [retry]
            max_attempts = 0

            [server]
            bind_address = "0.0.0.0:9000"
            public_url = "https://pods.example"
        "#;

        let config = Config::from_toml_str(text).unwrap();

        assert_eq!(config.user_agent, "custom-agent");
        assert_eq!(config.feeds.len(), 2);
        assert_eq!(
            config.feed("artist_two").unwrap().url,
            "https://media.example/artist/two"
        );
        assert!(config.feed("missing").is_none());
        assert_eq!(config.cache.cache_dir, PathBuf::from("/tmp/tc"));
        assert_eq!(config.cache.max_concurrent_downloads, 8);
        assert_eq!(config.cache.read_timeout, Duration::from_secs(15));
        assert!(!config.cache.prefetch_on_render);
        assert_eq!(config.retry.max_attempts, 0);
        assert_eq!(config.server.bind_address.port(), 9000);
        assert_eq!(config.server.public_url, "https://pods.example");
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let err = Config::from_toml_str("[cache]\nmax_concurrent_downloads = 0").unwrap_err();

        match err {
            Error::Config { key, .. } => {
                assert_eq!(key.as_deref(), Some("cache.max_concurrent_downloads"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn backoff_multiplier_bounds() {
        for bad in ["-1.0", "0.5", "nan", "inf"] {
            let err = Config::from_toml_str(&format!("[retry]\nbackoff_multiplier = {bad}"))
                .unwrap_err();
            assert!(
                matches!(&err, Error::Config { key: Some(k), .. } if k == "retry.backoff_multiplier"),
                "{bad}: {err:?}"
            );
        }

        let config = Config::from_toml_str("[retry]\nbackoff_multiplier = 1.0").unwrap();
        assert_eq!(config.retry.backoff_multiplier, 1.0);

        let mut config = Config::default();
        config.retry.backoff_multiplier = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_read_timeout_is_rejected() {
        let err = Config::from_toml_str("[cache]\nread_timeout = 0").unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(k), .. } if k == "cache.read_timeout"));
    }

    #[test]
    fn non_http_public_url_is_rejected() {
        let err = Config::from_toml_str("[server]\npublic_url = \"ftp://host\"").unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(k), .. } if k == "server.public_url"));
    }

    #[test]
    fn duplicate_feed_names_are_rejected() {
        let text = r#"
            [[feeds]]
            name = "same"
            url = "https://a.example"
            [[feeds]]
            name = "same"
            url = "https://b.example"
        "#;

        let err = Config::from_toml_str(text).unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn feed_names_must_be_route_safe() {
        let text = r#"
            [[feeds]]
            name = "has/slash"
            url = "https://a.example"
        "#;

        assert!(Config::from_toml_str(text).is_err());
    }

    #[test]
    fn unknown_type_is_a_config_error() {
        let err = Config::from_toml_str("[cache]\nread_timeout = \"forever\"").unwrap_err();
        assert!(matches!(err, Error::Config { key: None, .. }));
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let err = Config::from_toml_file("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
