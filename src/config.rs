use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scraping::base::DEFAULT_USER_AGENT;
use crate::scraping::sitemap::DEFAULT_MAX_AGE_DAYS;
use crate::utils;

pub const DEFAULT_SITEMAP_URL: &str = "https://swingrevolution.pl/events-sitemap.xml";
pub const DEFAULT_PUBLISH_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value `{value}` for {key}")]
    Env { key: &'static str, value: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub sitemap_url: String,
    pub instance_url: Option<String>,
    pub max_age_days: i64,
    pub publish_limit: usize,
    pub output_dir: PathBuf,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub ledger: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sitemap_url: DEFAULT_SITEMAP_URL.to_string(),
            instance_url: None,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            publish_limit: DEFAULT_PUBLISH_LIMIT,
            output_dir: PathBuf::from("output"),
            timeout_secs: 20,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            ledger: true,
        }
    }
}

impl AppConfig {
    /// Reads the config file, then applies the environment on top.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// A missing file gives the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("SWING_SCRAPE_SITEMAP_URL") {
            self.sitemap_url = url;
        }
        if let Some(url) = lookup("GANCIO_INSTANCE_URL") {
            self.instance_url = Some(url);
        }
        if let Some(days) = lookup("SWING_SCRAPE_MAX_AGE_DAYS") {
            self.max_age_days = parse_env("SWING_SCRAPE_MAX_AGE_DAYS", days)?;
        }
        if let Some(limit) = lookup("SWING_SCRAPE_PUBLISH_LIMIT") {
            self.publish_limit = parse_env("SWING_SCRAPE_PUBLISH_LIMIT", limit)?;
        }
        if let Some(dir) = lookup("SWING_SCRAPE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        utils::ensure_parent(path).map_err(io)?;
        let contents = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, contents).map_err(io)
    }
}

fn parse_env<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { key, value })
}
