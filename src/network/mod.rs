//! Network configuration store
//!
//! Networks are `<home>/networks/<name>.toml` files loaded through
//! [`NetworkConfig::load`].

pub mod version;

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::NetworkConfig;
use crate::error::{Error, Result};

pub use version::{is_compatible, HttpVersionProbe, VersionProbe, CLIENT_VERSION};

/// Network capability consumed by the bootstrap
pub trait NetworkStore: Send + Sync {
    fn network_exists(&self, name: &str) -> Result<bool>;

    fn get_network(&self, name: &str) -> Result<NetworkConfig>;

    fn list_networks(&self) -> Result<Vec<String>>;
}

/// Network store reading one TOML file per network
pub struct FileNetworkStore {
    networks_dir: PathBuf,
}

impl FileNetworkStore {
    /// Open the store under `home`, creating its directory if needed
    pub fn initialise(home: &Path) -> Result<Self> {
        let networks_dir = home.join("networks");
        std::fs::create_dir_all(&networks_dir).map_err(|e| {
            Error::Io(format!(
                "Failed to create {}: {}",
                networks_dir.display(),
                e
            ))
        })?;

        debug!("Network store opened at {}", networks_dir.display());
        Ok(Self { networks_dir })
    }

    fn network_path(&self, name: &str) -> PathBuf {
        self.networks_dir.join(format!("{}.toml", name))
    }
}

impl NetworkStore for FileNetworkStore {
    fn network_exists(&self, name: &str) -> Result<bool> {
        if name.is_empty() || name.contains(['/', '\\']) {
            return Ok(false);
        }
        Ok(self.network_path(name).is_file())
    }

    fn get_network(&self, name: &str) -> Result<NetworkConfig> {
        if !self.network_exists(name)? {
            return Err(Error::NetworkNotFound(name.to_string()));
        }

        let config = NetworkConfig::load(self.network_path(name))?;
        if config.name != name {
            return Err(Error::Config(format!(
                "network file {}.toml declares the name {:?}",
                name, config.name
            )));
        }
        Ok(config)
    }

    fn list_networks(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.networks_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
