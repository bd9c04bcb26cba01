use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format.
    Json,
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(Error::Config(format!("Unknown log format: {}", other))),
        }
    }
}

/// Common logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format: "text" or "json".
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Flat key-value configuration store.
///
/// Values come from a JSON5 object whose members are scalars (strings,
/// numbers or booleans) and may be overridden from the environment. Every
/// value is kept as its string form; typed access goes through
/// [`ConfigStore::get_parsed`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigStore {
    values: HashMap<String, String>,
}

impl ConfigStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from key-value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Load a store from a JSON5 file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::parse(&content).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{} ({})", msg, path.display())),
            other => other,
        })
    }

    /// Parse a store from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self> {
        let raw: HashMap<String, serde_json::Value> = json5::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;

        let mut values = HashMap::with_capacity(raw.len());
        for (key, value) in raw {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => number_to_string(&n),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Null => continue,
                _ => {
                    return Err(Error::InvalidValue {
                        key,
                        message: "nested values are not supported".to_string(),
                    });
                }
            };
            values.insert(key, value);
        }

        Ok(Self { values })
    }

    /// Override values with environment variables named `{prefix}{KEY}`.
    ///
    /// `NESTMON_NESTTOKEN` overrides `NESTTOKEN` when the prefix is `NESTMON_`.
    /// Variables whose name or value is not valid Unicode are skipped.
    pub fn with_env_overrides(self, prefix: &str) -> Self {
        let vars = std::env::vars_os()
            .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)));
        self.with_overrides(prefix, vars)
    }

    /// Override values from an explicit variable list.
    pub fn with_overrides<I>(mut self, prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            if let Some(key) = name.strip_prefix(prefix)
                && !key.is_empty()
            {
                self.values.insert(key.to_string(), value);
            }
        }
        self
    }

    /// Look up a required key.
    pub fn get(&self, key: &str) -> Result<&str> {
        self.get_opt(key)
            .ok_or_else(|| Error::MissingKey(key.to_string()))
    }

    /// Look up an optional key. Empty values count as absent.
    pub fn get_opt(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Look up and parse an optional key.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_opt(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|e: T::Err| Error::InvalidValue {
                    key: key.to_string(),
                    message: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Whether the store holds a non-empty value for `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.get_opt(key).is_some()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Logging configuration from `LOG_LEVEL` and `LOG_FORMAT`.
    pub fn logging(&self) -> Result<LoggingConfig> {
        Ok(LoggingConfig {
            level: self
                .get_opt("LOG_LEVEL")
                .map(str::to_string)
                .unwrap_or_else(default_log_level),
            format: self.get_parsed("LOG_FORMAT")?.unwrap_or_default(),
        })
    }
}

/// Whole numbers keep an integer form even if the parser produced a float.
fn number_to_string(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
        return i.to_string();
    }
    match n.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (f as i64).to_string(),
        _ => n.to_string(),
    }
}
