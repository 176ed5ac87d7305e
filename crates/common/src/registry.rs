//! Vault registry management
//!
//! The host application keeps a JSON registry (`obsidian.json`) in its
//! configuration directory mapping opaque vault ids to vault directories.
//! A vault can only be opened by id, so tests register their fixture vault
//! here first and launch the host with the returned id.
//!
//! The registry is read and rewritten as a whole on every change. There is
//! no locking: two runners registering into the same directory at the same
//! time can lose an entry.

use crate::{Error, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Registry file name inside the configuration directory
pub const REGISTRY_FILE: &str = "obsidian.json";

/// Scheme and host of the URI that asks the application to open a vault
pub const OPEN_URI_BASE: &str = "obsidian://open";

/// Environment variable naming an explicit registry directory
pub const REGISTRY_DIR_ENV: &str = "VAULTBRIDGE_REGISTRY_DIR";

/// Random bytes per vault id
const ID_BYTES: usize = 8;

/// Host platform classes with distinct configuration layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Windows,
    MacOs,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// Fail fast on platforms whose layout is not implemented
    pub fn ensure_supported(self) -> Result<()> {
        match self {
            Platform::MacOs => Err(Error::UnsupportedPlatform(
                "macOS configuration layout is not implemented".to_string(),
            )),
            Platform::Linux | Platform::Windows => Ok(()),
        }
    }

    /// Resolve the application's configuration directory from `env`
    pub fn config_dir<F>(self, env: F) -> Result<PathBuf>
    where
        F: Fn(&str) -> Option<OsString>,
    {
        self.ensure_supported()?;
        match self {
            Platform::Windows => env("APPDATA")
                .map(|appdata| PathBuf::from(appdata).join("Obsidian"))
                .ok_or_else(|| Error::InvalidConfig("APPDATA is not set".to_string())),
            _ => {
                if let Some(xdg) = env("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
                    return Ok(PathBuf::from(xdg).join("obsidian"));
                }
                env("HOME")
                    .map(|home| PathBuf::from(home).join(".config").join("obsidian"))
                    .ok_or_else(|| {
                        Error::InvalidConfig("neither XDG_CONFIG_HOME nor HOME is set".to_string())
                    })
            }
        }
    }

    /// Environment that points a child process at the registry in `dir`
    ///
    /// Always sets [`REGISTRY_DIR_ENV`]. When `dir` ends in the platform's
    /// directory name, the platform base variable is set to its parent as
    /// well, so a host that only knows the platform layout resolves the
    /// same directory.
    pub fn config_dir_env(self, dir: &Path) -> Vec<(String, OsString)> {
        let mut vars = vec![(REGISTRY_DIR_ENV.to_string(), dir.as_os_str().to_os_string())];

        let (base, leaf) = match self {
            Platform::Windows => ("APPDATA", "Obsidian"),
            Platform::Linux => ("XDG_CONFIG_HOME", "obsidian"),
            Platform::MacOs => return vars,
        };
        if dir.file_name().is_some_and(|name| name == leaf) {
            if let Some(parent) = dir.parent().filter(|p| !p.as_os_str().is_empty()) {
                vars.push((base.to_string(), parent.as_os_str().to_os_string()));
            }
        }
        vars
    }
}

/// One registered vault
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultRegistryEntry {
    /// Absolute path of the vault directory
    pub path: String,

    /// Registration time, ms since epoch
    pub ts: i64,

    /// Set by the host application while the vault is open
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<bool>,

    /// Keys the host application added that we do not interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// On-disk registry document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryFile {
    #[serde(default)]
    pub vaults: BTreeMap<String, VaultRegistryEntry>,

    /// Host application settings stored next to `vaults`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RegistryFile {
    /// Id of the entry whose path equals `path` exactly
    pub fn find_by_path(&self, path: &str) -> Option<&str> {
        self.vaults
            .iter()
            .find(|(_, entry)| entry.path == path)
            .map(|(id, _)| id.as_str())
    }
}

/// Reads and writes the host application's vault registry
#[derive(Debug, Clone)]
pub struct VaultRegistry {
    config_dir: PathBuf,
}

impl VaultRegistry {
    /// Registry in the current platform's configuration directory
    pub fn for_current_platform() -> Result<Self> {
        let dir = Platform::current().config_dir(|key| std::env::var_os(key))?;
        Ok(Self::at(dir))
    }

    /// Registry rooted at an explicit configuration directory
    pub fn at(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn registry_path(&self) -> PathBuf {
        self.config_dir.join(REGISTRY_FILE)
    }

    /// Path of the per-vault companion file for `id`
    pub fn companion_path(&self, id: &str) -> PathBuf {
        self.config_dir.join(format!("{}.json", id))
    }

    /// Load the registry, creating an empty one if it does not exist yet
    pub fn load(&self) -> Result<RegistryFile> {
        std::fs::create_dir_all(&self.config_dir)?;

        let path = self.registry_path();
        if !path.exists() {
            debug!("Initializing empty vault registry at {}", path.display());
            let empty = RegistryFile::default();
            self.save(&empty)?;
            return Ok(empty);
        }

        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|source| Error::RegistryCorruption { path, source })
    }

    /// Overwrite the registry file
    pub fn save(&self, registry: &RegistryFile) -> Result<()> {
        std::fs::create_dir_all(&self.config_dir)?;
        let content = serde_json::to_string(registry)?;
        std::fs::write(self.registry_path(), content)?;
        Ok(())
    }

    /// Id for `vault`, registering it on first use
    pub fn ensure_registered(&self, vault: &Path) -> Result<String> {
        let vault_path = absolute_path_string(vault)?;
        let mut registry = self.load()?;

        if let Some(id) = registry.find_by_path(&vault_path) {
            debug!("Vault {} already registered as {}", vault_path, id);
            return Ok(id.to_string());
        }

        let id = loop {
            let candidate = generate_id();
            if !registry.vaults.contains_key(&candidate) {
                break candidate;
            }
        };

        registry.vaults.insert(
            id.clone(),
            VaultRegistryEntry {
                path: vault_path.clone(),
                ts: chrono::Utc::now().timestamp_millis(),
                open: None,
                extra: Map::new(),
            },
        );
        self.save(&registry)?;
        std::fs::write(self.companion_path(&id), "{}")?;

        info!("Registered vault {} as {}", vault_path, id);
        Ok(id)
    }

    /// Id already assigned to `vault`, if any
    pub fn find_by_path(&self, vault: &Path) -> Result<Option<String>> {
        let vault_path = absolute_path_string(vault)?;
        let registry = self.load()?;
        Ok(registry.find_by_path(&vault_path).map(str::to_string))
    }

    /// Entry registered under `id`
    pub fn lookup(&self, id: &str) -> Result<Option<VaultRegistryEntry>> {
        Ok(self.load()?.vaults.remove(id))
    }

    /// All entries ordered by id
    pub fn entries(&self) -> Result<Vec<(String, VaultRegistryEntry)>> {
        Ok(self.load()?.vaults.into_iter().collect())
    }

    /// Record whether the vault `id` is currently open
    pub fn set_open(&self, id: &str, open: bool) -> Result<()> {
        let mut registry = self.load()?;
        let entry = registry
            .vaults
            .get_mut(id)
            .ok_or_else(|| Error::not_found("vault", id))?;
        entry.open = Some(open);
        self.save(&registry)
    }
}

/// `obsidian://open?vault=<id>`
pub fn open_uri(id: &str) -> Result<String> {
    let uri = url::Url::parse_with_params(OPEN_URI_BASE, &[("vault", id)])
        .map_err(|e| Error::InvalidUri(e.to_string()))?;
    Ok(uri.to_string())
}

/// Vault id carried by an open URI
pub fn id_from_open_uri(uri: &str) -> Result<String> {
    let parsed = url::Url::parse(uri).map_err(|e| Error::InvalidUri(format!("{}: {}", uri, e)))?;
    if parsed.scheme() != "obsidian" || parsed.host_str() != Some("open") {
        return Err(Error::InvalidUri(format!("{} is not an open URI", uri)));
    }
    parsed
        .query_pairs()
        .find(|(key, _)| key == "vault")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| Error::InvalidUri(format!("{} has no vault parameter", uri)))
}

fn generate_id() -> String {
    let mut bytes = [0u8; ID_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn absolute_path_string(path: &Path) -> Result<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    Ok(absolute.to_string_lossy().into_owned())
}
