//! Configuration management for config.toml
//!
//! Configuration file: ~/.config/memento/config.toml (or platform equivalent).
//! Every field has a default, so a missing file or a partial file is fine.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub agent: AgentSettings,
}

/// Language-model endpoint settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of an OpenAI-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Model name sent with every request
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
    /// Retries for transient failures (network, 429, 5xx)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Agent loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Seconds to rest between cycles
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    /// Path of the single persisted note
    #[serde(default = "default_memento_path")]
    pub memento_path: PathBuf,
    /// Directory holding the agent's scripts
    #[serde(default = "default_tools_dir")]
    pub tools_dir: PathBuf,
    /// Wall-clock limit for one script execution
    #[serde(default = "default_exec_timeout")]
    pub exec_timeout_secs: u64,
    /// Captured output is truncated past this many bytes
    #[serde(default = "default_max_output_len")]
    pub max_output_len: usize,
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_interval() -> u64 {
    15
}

fn default_exec_timeout() -> u64 {
    30
}

fn default_max_output_len() -> usize {
    50_000
}

fn data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("memento")
}

fn default_memento_path() -> PathBuf {
    data_root().join("memento.txt")
}

fn default_tools_dir() -> PathBuf {
    data_root().join("tools")
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            memento_path: default_memento_path(),
            tools_dir: default_tools_dir(),
            exec_timeout_secs: default_exec_timeout(),
            max_output_len: default_max_output_len(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read {}", path.as_ref().display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.as_ref().display()))
    }

    /// Get the configuration file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("memento").join("config.toml"))
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.agent.interval_secs)
    }

    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.exec_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }
}
