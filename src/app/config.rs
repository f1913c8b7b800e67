//! Optional `config.toml` with defaults for the command line.
//!
//! ```toml
//! master_role = "OrgMasterRole"
//! account_role = "OrgAuditRole"
//! concurrency = 20
//! cache_ttl_secs = 3600
//! cache_dir = "/var/cache/orgcrawler"
//! output = "yaml"
//! ```
//!
//! Every key is optional. Command line flags win over the file.

use crate::app::format::OutputFormat;
use crate::app::org::cache::DEFAULT_CACHE_TTL;
use crate::app::task_runner::DEFAULT_CONCURRENCY;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CrawlerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<OutputFormat>,
}

impl CrawlerConfig {
    /// `config.toml` in the platform config directory
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "", "orgcrawler")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load a config file; a missing file yields the defaults
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file {:?}", path))
    }

    /// Load from the default location, if there is one
    pub fn load() -> Result<Self> {
        match Self::default_path() {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1)
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_CACHE_TTL)
    }

    pub fn output(&self) -> OutputFormat {
        self.output.unwrap_or_default()
    }
}
