//! Configuration loader with environment variable expansion

use super::{
    BackendConfig, Config, ConfigError, CredentialsConfig, ProxyConfig, ServerConfig,
    DEFAULT_ADDRESS,
};
use crate::signing::S3_SERVICE;
use regex_lite::Regex;
use std::path::Path;
use std::sync::OnceLock;

/// Access key id callers sign with
pub const ACCESS_KEY_ENV: &str = "S3_ACCESS_KEY_ID";

/// Matching secret access key
pub const SECRET_KEY_ENV: &str = "S3_SECRET_ACCESS_KEY";

/// Backend endpoint
pub const ENDPOINT_ENV: &str = "S3_ENDPOINT";

/// Listen address, optional
pub const ADDRESS_ENV: &str = "PROXY_ADDRESS";

/// Signing service name, optional
pub const SERVICE_ENV: &str = "S3_SERVICE";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML text, expanding `${VAR}` references first
    pub fn from_yaml(content: &str) -> Result<Config, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from environment variables alone
    pub fn from_env() -> Result<Config, ConfigError> {
        let config = Config {
            server: ServerConfig {
                address: optional_env(ADDRESS_ENV).unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
            },
            backend: BackendConfig {
                endpoint: required_env(ENDPOINT_ENV)?,
                service: optional_env(SERVICE_ENV).unwrap_or_else(|| S3_SERVICE.to_string()),
                timeout_seconds: super::default_timeout_seconds(),
            },
            credentials: CredentialsConfig {
                access_key_id: required_env(ACCESS_KEY_ENV)?,
                secret_access_key: required_env(SECRET_KEY_ENV)?,
            },
            proxy: ProxyConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    optional_env(name).ok_or_else(|| ConfigError::MissingEnv(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").expect("env pattern is valid")
    })
}

/// Expand `${VAR_NAME}` and `${VAR_NAME:-default}`.
///
/// An unset variable without a default keeps its placeholder, so validation
/// reports it rather than silently using an empty value.
pub(crate) fn expand_env_vars(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut last = 0;

    for cap in env_pattern().captures_iter(content) {
        let Some(full) = cap.get(0) else { continue };
        result.push_str(&content[last..full.start()]);

        match std::env::var(&cap[1]) {
            Ok(value) => result.push_str(&value),
            Err(_) => match cap.get(2) {
                Some(default) => result.push_str(default.as_str()),
                None => result.push_str(full.as_str()),
            },
        }

        last = full.end();
    }

    result.push_str(&content[last..]);
    result
}
