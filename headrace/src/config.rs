use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::chain::Network;

/// Main configuration for a headrace node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Which base network the node anchors to.
    #[serde(default = "default_network")]
    pub network: Network,

    /// Our position in the ordered party list of the head this node
    /// takes part in.
    #[serde(default)]
    pub party_index: u32,

    /// Contestation period (seconds) used when this node initialises a
    /// head. Observed heads use whatever their init transaction froze.
    #[serde(default = "default_contestation_period")]
    pub contestation_period_secs: u64,

    /// Bound on events parked while they wait for prerequisites.
    #[serde(default = "default_wait_queue_depth")]
    pub wait_queue_depth: usize,

    /// Peer endpoints handed to the external transport.
    #[serde(default)]
    pub peers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: default_network(),
            party_index: 0,
            contestation_period_secs: default_contestation_period(),
            wait_queue_depth: default_wait_queue_depth(),
            peers: Vec::new(),
        }
    }
}

fn default_network() -> Network {
    Network::Testnet
}

fn default_contestation_period() -> u64 {
    60
}

fn default_wait_queue_depth() -> usize {
    256
}

impl Config {
    /// Load a config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config at {}", path.display()))
    }

    /// Write the config as pretty TOML.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }
}

/// Default data directory: `~/.headrace`.
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".headrace")
}

/// Default config file location.
pub fn default_config_path() -> PathBuf {
    default_data_dir().join("config.toml")
}

/// The identity keyfile lives next to the config file.
pub fn keyfile_path_from_config(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or(Path::new("."))
        .join("identity.json")
}

/// The event journal lives next to the config file.
pub fn journal_path_from_config(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .unwrap_or(Path::new("."))
        .join("events.log")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.contestation_period_secs = 120;
        config.peers = vec!["peer-1:7100".into()];
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.contestation_period_secs, 120);
        assert_eq!(loaded.peers, vec!["peer-1:7100".to_string()]);
        assert_eq!(loaded.network, Network::Testnet);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "network = \"mainnet\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.network, Network::Mainnet);
        assert_eq!(config.contestation_period_secs, 60);
        assert_eq!(config.wait_queue_depth, 256);
    }
}
