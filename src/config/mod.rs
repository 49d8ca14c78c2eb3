// ABOUTME: Client configuration loaded from ocidrv.yml.
// ABOUTME: Picks the driver, its uri and the connection timeouts; env vars override the file.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

pub const CONFIG_FILENAME: &str = "ocidrv.yml";
pub const CONFIG_FILENAME_ALT: &str = "ocidrv.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".ocidrv/config.yml";

pub const ENV_DRIVER: &str = "OCIDRV_DRIVER";
pub const ENV_URI: &str = "OCIDRV_URI";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Registered driver name.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Driver-specific endpoint; empty lets the driver decide.
    #[serde(default)]
    pub uri: String,

    #[serde(default = "default_open_timeout", with = "humantime_serde")]
    pub open_timeout: Duration,

    /// Limit for a single request. Unset means no limit.
    #[serde(default, with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

fn default_driver() -> String {
    "docker".to_string()
}

fn default_open_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            uri: String::new(),
            open_timeout: default_open_timeout(),
            request_timeout: None,
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load the first of `ocidrv.yml`, `ocidrv.yaml`, `.ocidrv/config.yml` in `dir`.
    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading config");
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Apply `OCIDRV_DRIVER` and `OCIDRV_URI` when set and non-empty.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(driver) = non_empty_var(ENV_DRIVER) {
            self.driver = driver;
        }
        if let Some(uri) = non_empty_var(ENV_URI) {
            self.uri = uri;
        }
        self
    }

    fn validate(&self) -> Result<()> {
        if self.driver.trim().is_empty() {
            return Err(Error::InvalidConfig("driver cannot be empty".to_string()));
        }
        if self.open_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "open_timeout must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::InvalidConfig(
                "request_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
