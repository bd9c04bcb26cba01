//! Configuration for the exporter.
//!
//! Settings are read from a flat [`ConfigStore`] using the keys below. A
//! provider is enabled when its token key is set.
//!
//! | Key | Default |
//! |-----|---------|
//! | `LISTEN` | `0.0.0.0:9100` |
//! | `PREFIX` | listener prefix such as `http://+:9100/`, used when `LISTEN` is absent |
//! | `MAX_CONCURRENCY` | available parallelism |
//! | `NESTTOKEN`, `DEVICEID` | - |
//! | `NEST_API_URL` | `https://developer-api.nest.com` |
//! | `NEST_TTL_SECS` / `NEST_TIMEOUT_SECS` | `59` / `10` |
//! | `OPENWEATHERTOKEN`, `CITYID` | - |
//! | `OPENWEATHER_API_URL` | `http://api.openweathermap.org` |
//! | `OPENWEATHER_TTL_SECS` / `OPENWEATHER_TIMEOUT_SECS` | `359` / `10` |
//! | `LOG_LEVEL` / `LOG_FORMAT` | `info` / `text` |

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use nestmon_common::{ConfigStore, LoggingConfig};
use thiserror::Error;
use url::{Host, Url};

/// Prefix of environment variables that override file values.
pub const ENV_PREFIX: &str = "NESTMON_";

pub const DEFAULT_LISTEN: &str = "0.0.0.0:9100";
pub const DEFAULT_NEST_API_URL: &str = "https://developer-api.nest.com";
pub const DEFAULT_OPENWEATHER_API_URL: &str = "http://api.openweathermap.org";

const DEFAULT_NEST_TTL_SECS: u64 = 59;
const DEFAULT_OPENWEATHER_TTL_SECS: u64 = 359;
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Store(#[from] nestmon_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

/// HTTP endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to listen on.
    pub listen: SocketAddr,
    /// Maximum number of scrapes handled at the same time.
    pub max_concurrency: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 9100),
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Number of processing units available to the process.
pub fn default_max_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Nest thermostat provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NestConfig {
    pub token: String,
    pub device_id: String,
    pub base_url: Url,
    pub ttl: Duration,
    pub timeout: Duration,
}

/// OpenWeather provider settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenWeatherConfig {
    pub token: String,
    pub city_id: String,
    pub base_url: Url,
    pub ttl: Duration,
    pub timeout: Duration,
}

/// Complete exporter configuration.
#[derive(Debug, Clone)]
pub struct ExporterConfig {
    pub server: ServerConfig,
    pub nest: Option<NestConfig>,
    pub openweather: Option<OpenWeatherConfig>,
    pub logging: LoggingConfig,
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file, with `NESTMON_*` environment overrides.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let store = ConfigStore::load(path)?.with_env_overrides(ENV_PREFIX);
        Self::from_store(&store)
    }

    /// Load configuration from the environment only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store = ConfigStore::new().with_env_overrides(ENV_PREFIX);
        Self::from_store(&store)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Self::from_store(&ConfigStore::parse(content)?)
    }

    /// Build and validate the configuration from a key-value store.
    pub fn from_store(store: &ConfigStore) -> Result<Self, ConfigError> {
        let listen = match (store.get_opt("LISTEN"), store.get_opt("PREFIX")) {
            (Some(listen), _) => listen.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("Invalid listen address: {}", listen))
            })?,
            (None, Some(prefix)) => parse_listen_prefix(prefix)?,
            (None, None) => ServerConfig::default().listen,
        };

        let server = ServerConfig {
            listen,
            max_concurrency: store
                .get_parsed("MAX_CONCURRENCY")?
                .unwrap_or_else(default_max_concurrency),
        };

        let nest = match store.get_opt("NESTTOKEN") {
            Some(token) => Some(NestConfig {
                token: token.to_string(),
                device_id: companion(store, "DEVICEID", "NESTTOKEN")?,
                base_url: api_url(store, "NEST_API_URL", DEFAULT_NEST_API_URL)?,
                ttl: secs(store, "NEST_TTL_SECS", DEFAULT_NEST_TTL_SECS)?,
                timeout: secs(store, "NEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            }),
            None => None,
        };

        let openweather = match store.get_opt("OPENWEATHERTOKEN") {
            Some(token) => Some(OpenWeatherConfig {
                token: token.to_string(),
                city_id: companion(store, "CITYID", "OPENWEATHERTOKEN")?,
                base_url: api_url(store, "OPENWEATHER_API_URL", DEFAULT_OPENWEATHER_API_URL)?,
                ttl: secs(store, "OPENWEATHER_TTL_SECS", DEFAULT_OPENWEATHER_TTL_SECS)?,
                timeout: secs(store, "OPENWEATHER_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            }),
            None => None,
        };

        let config = Self {
            server,
            nest,
            openweather,
            logging: store.logging()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_concurrency == 0 {
            return Err(ConfigError::Validation(
                "MAX_CONCURRENCY must be > 0".to_string(),
            ));
        }

        if self.nest.is_none() && self.openweather.is_none() {
            return Err(ConfigError::Validation(
                "No metric sources configured (set NESTTOKEN or OPENWEATHERTOKEN)".to_string(),
            ));
        }

        if let Some(nest) = &self.nest {
            validate_provider("NEST", &nest.base_url, nest.timeout)?;
        }

        if let Some(weather) = &self.openweather {
            validate_provider("OPENWEATHER", &weather.base_url, weather.timeout)?;
        }

        Ok(())
    }
}

fn validate_provider(prefix: &str, base_url: &Url, timeout: Duration) -> Result<(), ConfigError> {
    if timeout.is_zero() {
        return Err(ConfigError::Validation(format!(
            "{}_TIMEOUT_SECS must be > 0",
            prefix
        )));
    }

    if !matches!(base_url.scheme(), "http" | "https") || base_url.host_str().is_none() {
        return Err(ConfigError::Validation(format!(
            "{}_API_URL must be an http(s) URL with a host: {}",
            prefix, base_url
        )));
    }

    Ok(())
}

/// Read a provider base URL, falling back to `default`.
fn api_url(store: &ConfigStore, key: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = store.get_opt(key).unwrap_or(default).trim();
    Url::parse(raw).map_err(|e| ConfigError::Validation(format!("Invalid {}: {}: {}", key, raw, e)))
}

/// A key that must be present because `owner` is.
fn companion(store: &ConfigStore, key: &str, owner: &str) -> Result<String, ConfigError> {
    store
        .get_opt(key)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::Validation(format!("{} is set but {} is missing", owner, key)))
}

fn secs(store: &ConfigStore, key: &str, default: u64) -> Result<Duration, ConfigError> {
    Ok(Duration::from_secs(
        store.get_parsed(key)?.unwrap_or(default),
    ))
}

/// Parse a listener prefix such as `http://+:9100/` into a socket address.
///
/// `+`, `*` and host names bind all interfaces, as a prefix listener accepts
/// any address and matches the host per request. `localhost` binds the
/// loopback address. Without an explicit port the scheme default is used.
pub fn parse_listen_prefix(prefix: &str) -> Result<SocketAddr, ConfigError> {
    let invalid = |reason: &str| {
        ConfigError::Validation(format!("Invalid listen prefix {}: {}", prefix, reason))
    };

    let url = Url::parse(prefix.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }

    let port = url
        .port_or_known_default()
        .ok_or_else(|| invalid("missing port"))?;

    let ip = match url.host() {
        Some(Host::Ipv4(ip)) => IpAddr::V4(ip),
        Some(Host::Ipv6(ip)) => IpAddr::V6(ip),
        Some(Host::Domain(host)) if host.eq_ignore_ascii_case("localhost") => {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
        Some(Host::Domain(_)) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        None => return Err(invalid("missing host")),
    };

    Ok(SocketAddr::new(ip, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(pairs: &[(&str, &str)]) -> ConfigStore {
        ConfigStore::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse(r#"{ NESTTOKEN: "c.token", DEVICEID: "dev" }"#).unwrap();

        assert_eq!(config.server.listen.to_string(), DEFAULT_LISTEN);
        assert_eq!(config.server.max_concurrency, default_max_concurrency());
        assert!(config.openweather.is_none());

        let nest = config.nest.unwrap();
        assert_eq!(nest.token, "c.token");
        assert_eq!(nest.device_id, "dev");
        assert_eq!(nest.base_url.as_str(), "https://developer-api.nest.com/");
        assert_eq!(nest.ttl, Duration::from_secs(59));
        assert_eq!(nest.timeout, Duration::from_secs(10));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            LISTEN: "127.0.0.1:9191",
            MAX_CONCURRENCY: 3,
            NESTTOKEN: "c.token",
            DEVICEID: "dev",
            NEST_API_URL: "http://127.0.0.1:1234",
            NEST_TTL_SECS: 30,
            NEST_TIMEOUT_SECS: 5,
            OPENWEATHERTOKEN: "owm",
            CITYID: 5128581,
            OPENWEATHER_TTL_SECS: 600,
            LOG_LEVEL: "debug",
            LOG_FORMAT: "json",
        }"#;

        let config = ExporterConfig::parse(json).unwrap();

        assert_eq!(config.server.listen.to_string(), "127.0.0.1:9191");
        assert_eq!(config.server.max_concurrency, 3);

        let nest = config.nest.unwrap();
        assert_eq!(nest.base_url.as_str(), "http://127.0.0.1:1234/");
        assert_eq!(nest.ttl, Duration::from_secs(30));
        assert_eq!(nest.timeout, Duration::from_secs(5));

        let weather = config.openweather.unwrap();
        assert_eq!(weather.city_id, "5128581");
        assert_eq!(weather.base_url.as_str(), "http://api.openweathermap.org/");
        assert_eq!(weather.ttl, Duration::from_secs(600));
        assert_eq!(weather.timeout, Duration::from_secs(10));

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, nestmon_common::LogFormat::Json);
    }

    #[test]
    fn test_prefix_used_without_listen() {
        let config = ExporterConfig::from_store(&store(&[
            ("PREFIX", "http://+:9200/"),
            ("OPENWEATHERTOKEN", "owm"),
            ("CITYID", "1"),
        ]))
        .unwrap();
        assert_eq!(config.server.listen.to_string(), "0.0.0.0:9200");
    }

    #[test]
    fn test_listen_wins_over_prefix() {
        let config = ExporterConfig::from_store(&store(&[
            ("LISTEN", "127.0.0.1:9300"),
            ("PREFIX", "http://+:9200/"),
            ("OPENWEATHERTOKEN", "owm"),
            ("CITYID", "1"),
        ]))
        .unwrap();
        assert_eq!(config.server.listen.to_string(), "127.0.0.1:9300");
    }

    #[test]
    fn test_validate_no_sources() {
        let err = ExporterConfig::parse("{}").unwrap_err();
        assert!(err.to_string().contains("No metric sources configured"));
    }

    #[test]
    fn test_validate_token_without_device() {
        let err = ExporterConfig::from_store(&store(&[("NESTTOKEN", "c.token")])).unwrap_err();
        assert!(err.to_string().contains("DEVICEID is missing"));
    }

    #[test]
    fn test_validate_invalid_listen() {
        let err = ExporterConfig::from_store(&store(&[
            ("LISTEN", "not-an-address"),
            ("OPENWEATHERTOKEN", "owm"),
            ("CITYID", "1"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("Invalid listen address"));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let result = ExporterConfig::from_store(&store(&[
            ("MAX_CONCURRENCY", "0"),
            ("OPENWEATHERTOKEN", "owm"),
            ("CITYID", "1"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_zero_timeout() {
        let err = ExporterConfig::from_store(&store(&[
            ("NESTTOKEN", "c.token"),
            ("DEVICEID", "dev"),
            ("NEST_TIMEOUT_SECS", "0"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("NEST_TIMEOUT_SECS"));
    }

    #[test]
    fn test_zero_ttl_allowed() {
        let config = ExporterConfig::from_store(&store(&[
            ("NESTTOKEN", "c.token"),
            ("DEVICEID", "dev"),
            ("NEST_TTL_SECS", "0"),
        ]))
        .unwrap();
        assert_eq!(config.nest.unwrap().ttl, Duration::ZERO);
    }

    #[test]
    fn test_validate_bad_number() {
        let err = ExporterConfig::from_store(&store(&[
            ("OPENWEATHERTOKEN", "owm"),
            ("CITYID", "1"),
            ("OPENWEATHER_TTL_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Store(_)));
        assert!(err.to_string().contains("OPENWEATHER_TTL_SECS"));
    }

    #[test]
    fn test_validate_bad_api_url() {
        let result = ExporterConfig::from_store(&store(&[
            ("OPENWEATHERTOKEN", "owm"),
            ("CITYID", "1"),
            ("OPENWEATHER_API_URL", "ftp://weather"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_listen_prefix() {
        assert_eq!(
            parse_listen_prefix("http://+:9100/").unwrap().to_string(),
            "0.0.0.0:9100"
        );
        assert_eq!(
            parse_listen_prefix("http://*:8080/metrics/").unwrap().to_string(),
            "0.0.0.0:8080"
        );
        assert_eq!(
            parse_listen_prefix("http://localhost:9100/").unwrap().to_string(),
            "127.0.0.1:9100"
        );
        assert_eq!(
            parse_listen_prefix("http://10.0.0.5/").unwrap().to_string(),
            "10.0.0.5:80"
        );
        assert_eq!(
            parse_listen_prefix("http://[::1]:9100/").unwrap().to_string(),
            "[::1]:9100"
        );
        assert_eq!(
            parse_listen_prefix("https://[::1]/").unwrap().to_string(),
            "[::1]:443"
        );
        assert!(parse_listen_prefix("9100").is_err());
        assert!(parse_listen_prefix("http://").is_err());
        assert!(parse_listen_prefix("http://+:port/").is_err());
        assert!(parse_listen_prefix("ftp://+:21/").is_err());
    }

    #[test]
    fn test_parse_listen_prefix_host_name_binds_all() {
        assert_eq!(
            parse_listen_prefix("http://myhost:9100/").unwrap().to_string(),
            "0.0.0.0:9100"
        );
        assert_eq!(
            parse_listen_prefix("https://metrics.example.com/").unwrap().to_string(),
            "0.0.0.0:443"
        );
        assert_eq!(
            parse_listen_prefix("http://LOCALHOST:9100/").unwrap().to_string(),
            "127.0.0.1:9100"
        );
    }

    #[test]
    fn test_validate_api_url_without_host() {
        let err = ExporterConfig::from_store(&store(&[
            ("NESTTOKEN", "c.token"),
            ("DEVICEID", "dev"),
            ("NEST_API_URL", "http://"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("NEST_API_URL"));

        let err = ExporterConfig::from_store(&store(&[
            ("OPENWEATHERTOKEN", "owm"),
            ("CITYID", "1"),
            ("OPENWEATHER_API_URL", "not a url"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("OPENWEATHER_API_URL"));
    }
}
