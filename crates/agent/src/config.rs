//! Agent configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Vault directory to open
    pub vault: Option<PathBuf>,

    /// Directory holding the vault registry (platform default when unset)
    pub registry_dir: Option<PathBuf>,

    /// Serve TCP on this address instead of stdio
    pub listen: Option<String>,

    /// Indexer configuration
    pub indexer: IndexerConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            vault: None,
            registry_dir: None,
            listen: None,
            indexer: IndexerConfig::default(),
        }
    }
}

/// Background indexer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Delay before each indexing pass
    pub delay_ms: u64,

    /// Re-index on filesystem changes
    pub watch: bool,

    /// Top-level names never indexed
    pub ignore: Vec<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            delay_ms: 0,
            watch: true,
            ignore: vec![".obsidian".to_string(), ".trash".to_string()],
        }
    }
}

impl IndexerConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl AgentConfig {
    /// Load configuration from file
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = AgentConfig::load(&tmp.path().join("agent.toml")).unwrap();
        assert!(config.vault.is_none());
        assert!(config.indexer.watch);
        assert_eq!(config.indexer.ignore, vec![".obsidian", ".trash"]);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("agent.toml");
        std::fs::write(&path, "vault = \"/v\"\n\n[indexer]\ndelay_ms = 250\n").unwrap();

        let config = AgentConfig::load(&path).unwrap();
        assert_eq!(config.vault, Some(PathBuf::from("/v")));
        assert_eq!(config.indexer.delay(), Duration::from_millis(250));
        assert!(config.indexer.watch);
    }

    #[test]
    fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("agent.toml");
        let mut config = AgentConfig::default();
        config.listen = Some("127.0.0.1:7777".to_string());
        config.save(&path).unwrap();

        let loaded = AgentConfig::load(&path).unwrap();
        assert_eq!(loaded.listen.as_deref(), Some("127.0.0.1:7777"));
    }
}
