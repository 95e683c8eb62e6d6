//! Configuration management for trimem.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (TRIMEM_*)
//! 2. Config file ($TRIMEM_CONFIG or the platform data dir's config.toml)
//! 3. Default values

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use trimem_core::gateway::HttpGatewayConfig;
use trimem_sdk::EngineConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Language model gateway settings
    pub gateway: HttpGatewayConfig,

    /// Engine thresholds, weights and limits
    pub engine: EngineConfig,

    /// Store locations
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding facts.db, episodes.db and graph.db
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "trimem", "trimem") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".trimem")
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        let mut config = if config_path.exists() {
            Self::from_file(&config_path)?
        } else {
            Config::default()
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        config
            .engine
            .validate()
            .context("Invalid engine configuration")?;

        Ok(config)
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content).context("Failed to parse config file")
    }

    /// Apply `TRIMEM_*` overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup("TRIMEM_GATEWAY_URL") {
            self.gateway.base_url = url;
        }
        if let Some(key) = lookup("TRIMEM_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            self.gateway.api_key = Some(key);
        }
        if let Some(model) = lookup("TRIMEM_CHAT_MODEL") {
            self.gateway.chat_model = model;
        }
        if let Some(model) = lookup("TRIMEM_EMBEDDING_MODEL") {
            self.gateway.embedding_model = model;
        }
        if let Some(dir) = lookup("TRIMEM_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(threshold) = lookup("TRIMEM_CONFIDENCE_THRESHOLD") {
            self.engine.confidence_threshold = threshold
                .trim()
                .parse()
                .with_context(|| format!("TRIMEM_CONFIDENCE_THRESHOLD is not a number: {threshold}"))?;
        }
        Ok(())
    }

    /// Get the config file path.
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("TRIMEM_CONFIG") {
            PathBuf::from(path)
        } else {
            default_data_dir().join("config.toml")
        }
    }
}
