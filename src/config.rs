//! Configuration management for Branchcoin

use crate::error::ChainError;
use crate::node::NodeSettings;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "branchcoin.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub data_dir: PathBuf,
    pub chain_file: String,
    /// Recipient key paid by locally mined coinbases.
    pub coinbase_key: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            chain_file: "blockchain".to_string(),
            coinbase_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MinerConfig {
    pub enabled: bool,
    #[serde(deserialize_with = "human_duration")]
    pub budget: Duration,
    #[serde(deserialize_with = "human_duration")]
    pub idle_pause: Duration,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            budget: Duration::from_millis(50),
            idle_pause: Duration::ZERO,
        }
    }
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ChainError> {
        toml::from_str(text).map_err(|e| ChainError::Config(e.to_string()))
    }

    pub fn chain_path(&self) -> PathBuf {
        self.node.data_dir.join(&self.node.chain_file)
    }

    pub fn node_settings(&self) -> NodeSettings {
        NodeSettings {
            mining_enabled: self.miner.enabled,
            mining_budget: self.miner.budget,
            idle_pause: self.miner.idle_pause,
        }
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        if self.node.chain_file.is_empty() {
            return Err(ChainError::Config("node.chain_file must not be empty".to_string()));
        }
        if self.miner.enabled && self.node.coinbase_key.is_empty() {
            return Err(ChainError::Config(
                "node.coinbase_key must be set when mining is enabled".to_string(),
            ));
        }
        if self.miner.enabled && self.miner.budget.is_zero() {
            return Err(ChainError::Config("miner.budget must be positive".to_string()));
        }
        Ok(())
    }
}

/// Reads `path`, or `branchcoin.toml` if present, or falls back to defaults.
///
/// The result is not validated; callers apply overrides first.
pub fn load_config(path: Option<&Path>) -> Result<Config, ChainError> {
    let text = match path {
        Some(path) => fs::read_to_string(path)?,
        None => fs::read_to_string(DEFAULT_CONFIG_FILE).unwrap_or_default(),
    };
    if text.trim().is_empty() {
        return Ok(Config::default());
    }
    Config::from_toml(&text)
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("branchcoin"))
        .unwrap_or_else(|| PathBuf::from("./branchcoin"))
}

fn human_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    humantime::parse_duration(&text).map_err(serde::de::Error::custom)
}
