//! Harness configuration

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vaultbridge_common::{VaultRegistry, DEFAULT_INDEXING_TIMEOUT_MS};

use crate::error::HarnessResult;

/// Harness configuration, usually read from `vaultbridge.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Vault opened by the host application
    pub vault: Option<PathBuf>,

    /// Vault registry directory (platform default when unset)
    pub registry_dir: Option<PathBuf>,

    /// Timeout for the indexing wait after launch
    pub indexing_timeout_ms: u64,

    /// Host application settings
    pub host: HostConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            vault: None,
            registry_dir: None,
            indexing_timeout_ms: DEFAULT_INDEXING_TIMEOUT_MS,
            host: HostConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Load from a TOML file; a missing file yields the defaults
    pub fn load(path: &Path) -> HarnessResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn indexing_timeout(&self) -> Duration {
        Duration::from_millis(self.indexing_timeout_ms)
    }

    /// Registry the host application reads
    pub fn registry(&self) -> HarnessResult<VaultRegistry> {
        Ok(match &self.registry_dir {
            Some(dir) => VaultRegistry::at(dir),
            None => VaultRegistry::for_current_platform()?,
        })
    }
}

/// How the host application is started
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Executable or `app.asar`; discovered from the install locations when unset
    pub program: Option<PathBuf>,

    /// Arguments placed before the vault URI
    pub args: Vec<String>,

    /// Extra environment for the host process
    pub env: BTreeMap<String, String>,

    /// Time allowed for the bridge to report ready
    pub startup_timeout_secs: u64,

    /// Time between SIGTERM and kill when stopping
    pub stop_grace_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            env: BTreeMap::new(),
            startup_timeout_secs: 30,
            stop_grace_ms: 500,
        }
    }
}

impl HostConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }
}
