//! Service store, holding the secret the session tokens are tagged with

use std::fs;
use std::path::{Path, PathBuf};

use base64::Engine;
use rand::RngCore;
use tracing::info;

use crate::error::{Error, Result};

const TOKEN_SECRET_FILE: &str = "token-secret";
const TOKEN_SECRET_LEN: usize = 32;

pub trait ServiceStore: Send + Sync {
    fn is_initialised(&self) -> Result<bool>;

    fn token_secret(&self) -> Result<Vec<u8>>;
}

/// Service state kept under `<home>/service`
pub struct FileServiceStore {
    service_dir: PathBuf,
}

impl FileServiceStore {
    pub fn initialise(home: &Path) -> Result<Self> {
        let service_dir = home.join("service");
        fs::create_dir_all(&service_dir)
            .map_err(|e| Error::Io(format!("{}: {}", service_dir.display(), e)))?;
        Ok(Self { service_dir })
    }

    fn secret_path(&self) -> PathBuf {
        self.service_dir.join(TOKEN_SECRET_FILE)
    }

    /// Generate the token secret. An existing one is kept unless `force` is set.
    pub fn generate_token_secret(&self, force: bool) -> Result<()> {
        let path = self.secret_path();
        if path.exists() && !force {
            return Err(Error::Config(
                "the service is already initialised, use --force to overwrite it".into(),
            ));
        }

        let mut secret = [0u8; TOKEN_SECRET_LEN];
        rand::thread_rng().fill_bytes(&mut secret);
        let encoded = base64::engine::general_purpose::STANDARD.encode(secret);

        fs::write(&path, encoded).map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o600))
                .map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        }

        info!("Service initialised at {}", self.service_dir.display());
        Ok(())
    }
}

impl ServiceStore for FileServiceStore {
    fn is_initialised(&self) -> Result<bool> {
        Ok(self.secret_path().is_file())
    }

    fn token_secret(&self) -> Result<Vec<u8>> {
        let path = self.secret_path();
        if !path.is_file() {
            return Err(Error::ServiceNotInitialised);
        }

        let encoded =
            fs::read_to_string(&path).map_err(|e| Error::Io(format!("{}: {}", path.display(), e)))?;
        let secret = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Serialization(format!("invalid token secret: {}", e)))?;
        if secret.len() != TOKEN_SECRET_LEN {
            return Err(Error::Serialization(format!(
                "token secret should be {} bytes, got {}",
                TOKEN_SECRET_LEN,
                secret.len()
            )));
        }
        Ok(secret)
    }
}
