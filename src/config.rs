//! Configuration file loading with environment variable overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::client::ClientConfig;
use crate::error::ClientError;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Server connection.
    #[serde(default)]
    pub server: ServerConfig,

    /// Default request values.
    #[serde(default)]
    pub defaults: DefaultsConfig,
}

/// The `[server]` section.
#[derive(Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// API base URL, e.g. `http://127.0.0.1:7860/sdapi/v1`.
    pub base_url: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
}

/// The `[defaults]` section.
#[derive(Debug, Default, Deserialize)]
pub struct DefaultsConfig {
    /// Sampler used when a request leaves it unset.
    pub sampler: Option<String>,
    /// Step count used when a request leaves it unset.
    pub steps: Option<u32>,
}

impl Config {
    /// Load configuration from the given path, or return defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ClientError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClientError::Config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&contents)
            .map_err(|e| ClientError::Config(format!("Failed to parse config {}: {e}", path.display())))
    }

    /// Base URL, preferring `STARRYSKY_BASE_URL`.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        env_nonempty("STARRYSKY_BASE_URL").or_else(|| self.server.base_url.clone())
    }

    /// Token, preferring `STARRYSKY_TOKEN`.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        env_nonempty("STARRYSKY_TOKEN").or_else(|| self.server.token.clone())
    }

    /// Settings for a [`Client`](crate::Client).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Config`] naming the setting and its variable
    /// when the base URL or token is not configured anywhere.
    pub fn client_config(&self) -> Result<ClientConfig, ClientError> {
        let base_url = self.base_url().ok_or_else(|| {
            ClientError::Config("base_url is not set ([server] base_url or STARRYSKY_BASE_URL)".into())
        })?;
        let token = self.token().ok_or_else(|| {
            ClientError::Config("token is not set ([server] token or STARRYSKY_TOKEN)".into())
        })?;
        Ok(ClientConfig {
            base_url,
            token,
            default_sampler: self.defaults.sampler.clone(),
            default_steps: self.defaults.steps,
        })
    }
}

fn env_nonempty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Discover the config file path using the resolution order:
/// 1. Explicit path (from `--config` flag)
/// 2. `STARRYSKY_CONFIG` environment variable
/// 3. `~/.config/starrysky/config.toml`
#[must_use]
pub fn discover_config_path(explicit: Option<&str>) -> PathBuf {
    if let Some(p) = explicit {
        return PathBuf::from(p);
    }

    if let Ok(p) = std::env::var("STARRYSKY_CONFIG") {
        return PathBuf::from(p);
    }

    default_config_path()
}

/// Default config path: `~/.config/starrysky/config.toml`.
fn default_config_path() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config/starrysky/config.toml")
    } else {
        PathBuf::from("starrysky.toml")
    }
}
