use crate::error::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SETTINGS_FILE: &str = "settings.toml";

/// User-editable node settings, persisted between runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Ledger node API port
    #[serde(default = "default_iri_port")]
    pub iri_port: u16,

    /// Expose the ledger node API beyond localhost
    #[serde(default)]
    pub iri_public: bool,

    /// Name announced by peer discovery
    #[serde(default = "default_name")]
    pub name: String,

    /// Peer transport protocol (`udp`, `tcp` or `any`)
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            iri_port: default_iri_port(),
            iri_public: false,
            name: default_name(),
            protocol: default_protocol(),
        }
    }
}

fn default_iri_port() -> u16 {
    14265
}
fn default_name() -> String {
    "nodekeeper".to_string()
}
fn default_protocol() -> String {
    "any".to_string()
}

/// Persisted settings record
pub trait SettingsStore: Send + Sync {
    /// Current settings
    fn read(&self) -> NodeSettings;

    /// Persist new settings
    fn save(&self, settings: &NodeSettings) -> Result<()>;

    /// Re-read settings from the backing store
    fn reload(&self) -> Result<NodeSettings> {
        Ok(self.read())
    }
}

/// Settings persisted as `settings.toml` under the storage directory
pub struct TomlSettingsStore {
    path: PathBuf,
    current: RwLock<NodeSettings>,
}

impl TomlSettingsStore {
    /// Open the store, falling back to defaults when no file exists yet
    pub fn open<P: AsRef<Path>>(storage_directory: P) -> Result<Self> {
        let path = storage_directory.as_ref().join(SETTINGS_FILE);
        let current = if path.exists() {
            Self::read_file(&path)?
        } else {
            info!("No settings file at {:?}, using defaults", path);
            NodeSettings::default()
        };

        Ok(Self {
            path,
            current: RwLock::new(current),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_file(path: &Path) -> Result<NodeSettings> {
        let contents = std::fs::read_to_string(path)?;
        let settings = toml::from_str(&contents)?;
        debug!("Loaded settings from {:?}: {:?}", path, settings);
        Ok(settings)
    }
}

impl SettingsStore for TomlSettingsStore {
    fn read(&self) -> NodeSettings {
        self.current.read().clone()
    }

    fn save(&self, settings: &NodeSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let rendered = toml::to_string_pretty(settings)?;
        // Replace atomically via a temp file
        let staging = self.path.with_extension("toml.tmp");
        std::fs::write(&staging, rendered)?;
        std::fs::rename(&staging, &self.path)?;

        *self.current.write() = settings.clone();
        info!("Settings saved to {:?}", self.path);
        Ok(())
    }

    fn reload(&self) -> Result<NodeSettings> {
        if !self.path.exists() {
            warn!("Settings file {:?} disappeared, keeping current settings", self.path);
            return Ok(self.read());
        }
        let settings = Self::read_file(&self.path)?;
        *self.current.write() = settings.clone();
        Ok(settings)
    }
}
