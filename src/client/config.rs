//! Check-in client configuration
//!
//! Values come from an optional TOML file, then from environment variables,
//! which win over the file:
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `CLIENT_API_URL` | server base URL | `http://127.0.0.1:3000` |
//! | `CLIENT_API_TOKEN` | bearer token | none |
//! | `CLIENT_ACTOR_ID` | stamped as `created_by` | none |
//! | `CHECKIN_DB_PATH` | queue database file | platform data dir |
//! | `SYNC_INTERVAL_SECS` | timer period | 30 |
//! | `SYNC_MAX_RETRIES` | retry ceiling | 5 |
//! | `SYNC_REQUEST_TIMEOUT_SECS` | per-request timeout | 15 |
//! | `SYNC_DRAIN_DEADLINE_SECS` | per-pass deadline | 120 |
//! | `SYNC_PROBE_INTERVAL_SECS` | health probe period | off |
//!
//! `CHECKIN_CONFIG` names the TOML file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::client::sync::SyncConfig;
use crate::shared::config::{AppConfig, ConfigError};

/// Default server URL
const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Keys accepted in the TOML file
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub actor_id: Option<String>,
    pub db_path: Option<PathBuf>,
    pub sync_interval_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    pub drain_deadline_secs: Option<u64>,
    pub probe_interval_secs: Option<u64>,
    pub retry_validation_errors: Option<bool>,
}

impl FileConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

/// Client configuration wrapper
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    app: AppConfig,
    actor_id: Option<String>,
    db_path: Option<PathBuf>,
    sync: SyncConfig,
}

fn parse_value<T: FromStr>(key: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(None),
    }
}

impl ClientConfig {
    /// Load `CHECKIN_CONFIG` (if set) and the environment
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var("CHECKIN_CONFIG") {
            Ok(path) => Some(FileConfig::from_path(path)?),
            Err(_) => None,
        };
        Self::from_sources(|key| std::env::var(key).ok(), file.unwrap_or_default())
    }

    /// Build from a variable lookup and file values; lookup wins
    pub fn from_sources<F>(lookup: F, file: FileConfig) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_url = lookup("CLIENT_API_URL")
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());

        let mut builder = AppConfig::builder().server_url(server_url);
        if let Some(token) = lookup("CLIENT_API_TOKEN").or(file.api_token) {
            builder = builder.api_token(token);
        }
        let app = builder.build()?;

        let defaults = SyncConfig::default();
        let secs = |key: &'static str, file_value: Option<u64>| -> Result<Option<Duration>, ConfigError> {
            let value = parse_value::<u64>(key, lookup(key))?.or(file_value);
            match value {
                Some(0) => Err(ConfigError::InvalidValue {
                    key,
                    value: "0".to_string(),
                }),
                other => Ok(other.map(Duration::from_secs)),
            }
        };

        let sync = SyncConfig {
            sync_interval: secs("SYNC_INTERVAL_SECS", file.sync_interval_secs)?
                .unwrap_or(defaults.sync_interval),
            max_retries: parse_value::<u32>("SYNC_MAX_RETRIES", lookup("SYNC_MAX_RETRIES"))?
                .or(file.max_retries)
                .unwrap_or(defaults.max_retries),
            request_timeout: secs("SYNC_REQUEST_TIMEOUT_SECS", file.request_timeout_secs)?
                .unwrap_or(defaults.request_timeout),
            drain_deadline: secs("SYNC_DRAIN_DEADLINE_SECS", file.drain_deadline_secs)?
                .unwrap_or(defaults.drain_deadline),
            probe_interval: secs("SYNC_PROBE_INTERVAL_SECS", file.probe_interval_secs)?,
            retry_validation_errors: file
                .retry_validation_errors
                .unwrap_or(defaults.retry_validation_errors),
            ..defaults
        };
        if sync.max_retries == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SYNC_MAX_RETRIES",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            app,
            actor_id: lookup("CLIENT_ACTOR_ID").or(file.actor_id),
            db_path: lookup("CHECKIN_DB_PATH").map(PathBuf::from).or(file.db_path),
            sync,
        })
    }

    pub fn server_url(&self) -> &str {
        self.app.server_url.as_deref().unwrap_or(DEFAULT_SERVER_URL)
    }

    /// Get the full URL for an API endpoint
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.server_url(), path)
    }

    pub fn token(&self) -> Option<&str> {
        self.app.api_token.as_deref()
    }

    pub fn actor_id(&self) -> Option<&str> {
        self.actor_id.as_deref()
    }

    /// Queue database path, if one was configured
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn sync(&self) -> &SyncConfig {
        &self.sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_sources(lookup(&[]), FileConfig::default()).unwrap();
        assert_eq!(config.server_url(), "http://127.0.0.1:3000");
        assert_eq!(config.api_url("/api/sync"), "http://127.0.0.1:3000/api/sync");
        assert!(config.token().is_none());
        assert_eq!(config.sync(), &SyncConfig::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let file = FileConfig::parse(
            r#"
            api_url = "https://file.example.org"
            actor_id = "kiosk-file"
            sync_interval_secs = 60
            max_retries = 3
            "#,
        )
        .unwrap();
        let config = ClientConfig::from_sources(
            lookup(&[("CLIENT_API_URL", "https://env.example.org/"), ("SYNC_MAX_RETRIES", "7")]),
            file,
        )
        .unwrap();

        assert_eq!(config.server_url(), "https://env.example.org");
        assert_eq!(config.actor_id(), Some("kiosk-file"));
        assert_eq!(config.sync().sync_interval, Duration::from_secs(60));
        assert_eq!(config.sync().max_retries, 7);
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let err = ClientConfig::from_sources(
            lookup(&[("SYNC_INTERVAL_SECS", "soon")]),
            FileConfig::default(),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidValue {
                key: "SYNC_INTERVAL_SECS",
                value: "soon".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_file_key_is_rejected() {
        assert!(matches!(
            FileConfig::parse("colour = \"blue\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
