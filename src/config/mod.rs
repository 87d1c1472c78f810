//! Configuration module for the SigV4 relay
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion, an environment-only mode, and validation.

use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod loader;

pub use loader::{
    ConfigLoader, ACCESS_KEY_ENV, ADDRESS_ENV, ENDPOINT_ENV, SECRET_KEY_ENV, SERVICE_ENV,
};

/// Listen address used when none is configured
pub const DEFAULT_ADDRESS: &str = "0.0.0.0:8080";

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        ConfigLoader::from_env()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.socket_addr()?;
        self.backend.endpoint_url()?;

        if self.backend.service.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "backend.service cannot be empty".into(),
            ));
        }

        if self.backend.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "backend.timeout_seconds must be greater than zero".into(),
            ));
        }

        if self.credentials.access_key_id.trim().is_empty()
            || self.credentials.secret_access_key.is_empty()
        {
            return Err(ConfigError::ValidationError(
                "credentials.access_key_id and credentials.secret_access_key are required".into(),
            ));
        }

        // An unexpanded placeholder means the variable was never set
        if self.credentials.access_key_id.starts_with("${")
            || self.credentials.secret_access_key.starts_with("${")
        {
            return Err(ConfigError::ValidationError(
                "credentials reference an unset environment variable".into(),
            ));
        }

        if let Some(ref extensions) = self.proxy.head_unsupported_extensions {
            if extensions.iter().any(|ext| ext.trim().is_empty()) {
                return Err(ConfigError::ValidationError(
                    "proxy.head_unsupported_extensions contains an empty entry".into(),
                ));
            }
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
        }
    }
}

impl ServerConfig {
    /// Parsed listen address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.address.parse().map_err(|_| {
            ConfigError::ValidationError(format!("Invalid server address '{}'", self.address))
        })
    }
}

fn default_address() -> String {
    DEFAULT_ADDRESS.to_string()
}

/// Backend (S3-compatible service) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// `https://host[:port]`, `http://host[:port]` or a bare `host[:port]`
    pub endpoint: String,
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl BackendConfig {
    /// Endpoint as a URL. A bare host implies `https`.
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ConfigError::ValidationError(
                "backend.endpoint cannot be empty".into(),
            ));
        }

        let candidate = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("https://{}", endpoint)
        };

        let url = Url::parse(&candidate).map_err(|e| {
            ConfigError::ValidationError(format!("Invalid backend endpoint '{}': {}", endpoint, e))
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid backend endpoint scheme '{}': must be http or https",
                    other
                )))
            }
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(ConfigError::ValidationError(format!(
                "Backend endpoint '{}' has no host",
                endpoint
            )));
        }

        Ok(url)
    }

    /// Outbound request timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_service() -> String {
    crate::signing::S3_SERVICE.to_string()
}

pub(crate) fn default_timeout_seconds() -> u64 {
    30
}

/// The credential pair callers sign with and the proxy re-signs with
#[derive(Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .finish()
    }
}

/// Request handling options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Reject malformed `aws-chunked` bodies instead of forwarding the
    /// decoded prefix
    #[serde(default)]
    pub strict_chunk_framing: bool,

    /// Replaces the built-in list of extensions the backend cannot `HEAD`
    #[serde(default)]
    pub head_unsupported_extensions: Option<Vec<String>>,
}
