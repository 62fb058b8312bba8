//! Client configuration: defaults, then `vetcare.toml`, then environment.

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const CONFIG_FILE: &str = "vetcare.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_TIMEOUT,
            user_agent: concat!("vetcare-core/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    request_timeout_secs: Option<u64>,
    user_agent: Option<String>,
}

impl ClientConfig {
    /// Defaults, overridden by `vetcare.toml` in the working directory when
    /// present, then by `VETCARE_*` environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Path::new(CONFIG_FILE);
        let config = if path.exists() {
            Self::default().merge_file(path)?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok())
    }

    pub fn merge_file(self, path: &Path) -> Result<Self, ConfigError> {
        let origin = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: origin.clone(),
            source,
        })?;
        self.merge_toml(&raw, &origin)
    }

    pub fn merge_toml(mut self, raw: &str, origin: &str) -> Result<Self, ConfigError> {
        let file: FileConfig = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        if let Some(base_url) = file.base_url {
            self.base_url = validate_base_url("base_url", base_url)?;
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = validate_timeout("request_timeout_secs", secs)?;
        }
        if let Some(user_agent) = file.user_agent {
            self.user_agent = user_agent;
        }
        Ok(self)
    }

    /// Apply `VETCARE_BASE_URL`, `VETCARE_TIMEOUT_SECS` and
    /// `VETCARE_USER_AGENT` as returned by `lookup`.
    pub fn apply_env<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup("VETCARE_BASE_URL") {
            self.base_url = validate_base_url("VETCARE_BASE_URL", base_url)?;
        }
        if let Some(raw) = lookup("VETCARE_TIMEOUT_SECS") {
            let secs = raw.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "VETCARE_TIMEOUT_SECS",
                value: raw.clone(),
            })?;
            self.request_timeout = validate_timeout("VETCARE_TIMEOUT_SECS", secs)?;
        }
        if let Some(user_agent) = lookup("VETCARE_USER_AGENT") {
            self.user_agent = user_agent;
        }
        Ok(self)
    }
}

fn validate_base_url(key: &'static str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        return Ok(trimmed.trim_end_matches('/').to_string());
    }
    Err(ConfigError::InvalidValue { key, value })
}

fn validate_timeout(key: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key,
            value: secs.to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_point_at_local_backend() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.request_timeout, DEFAULT_TIMEOUT);
        assert!(config.user_agent.starts_with("vetcare-core/"));
    }

    #[test]
    fn file_values_override_defaults() {
        let config = ClientConfig::default()
            .merge_toml(
                "base_url = \"https://api.vetcare.example/\"\nrequest_timeout_secs = 30\n",
                "vetcare.toml",
            )
            .unwrap();
        assert_eq!(config.base_url, "https://api.vetcare.example");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn unknown_file_keys_are_rejected() {
        let err = ClientConfig::default()
            .merge_toml("retries = 3\n", "vetcare.toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn env_overrides_file() {
        let config = ClientConfig::default()
            .merge_toml("base_url = \"http://file:1\"\n", "vetcare.toml")
            .unwrap()
            .apply_env(env(&[
                ("VETCARE_BASE_URL", "http://env:2"),
                ("VETCARE_USER_AGENT", "tests"),
            ]))
            .unwrap();
        assert_eq!(config.base_url, "http://env:2");
        assert_eq!(config.user_agent, "tests");
    }

    #[test]
    fn invalid_env_values_are_errors() {
        let err = ClientConfig::default()
            .apply_env(env(&[("VETCARE_TIMEOUT_SECS", "soon")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "VETCARE_TIMEOUT_SECS",
                ..
            }
        ));

        let err = ClientConfig::default()
            .apply_env(env(&[("VETCARE_BASE_URL", "ftp://nope")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let err = ClientConfig::default()
            .merge_toml("request_timeout_secs = 0\n", "vetcare.toml")
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
