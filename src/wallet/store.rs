//! File-backed wallet store
//!
//! Each wallet is a `<home>/wallets/<name>.json` record holding a salted
//! SHA-256 of its passphrase.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Pattern a wallet name must follow, as it becomes a file name
const WALLET_NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._-]*$";

/// Wallet capability consumed by the bootstrap and the client API
#[async_trait]
pub trait WalletStore: Send + Sync {
    /// Names of all wallets, sorted
    async fn list_wallets(&self) -> Result<Vec<String>>;

    /// Unlock a wallet, failing on unknown wallet or wrong passphrase
    async fn unlock(&self, name: &str, passphrase: &str) -> Result<WalletSummary>;
}

/// Public view of an unlocked wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSummary {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Persisted wallet record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletRecord {
    pub name: String,
    /// Hex encoded random salt
    pub salt: String,
    /// Hex encoded SHA-256 of salt and passphrase
    pub passphrase_hash: String,
    pub created_at: DateTime<Utc>,
}

impl WalletRecord {
    fn new(name: &str, passphrase: &str) -> Self {
        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let salt = to_hex(&salt);
        let passphrase_hash = hash_passphrase(&salt, passphrase);

        Self {
            name: name.to_string(),
            salt,
            passphrase_hash,
            created_at: Utc::now(),
        }
    }

    fn matches(&self, passphrase: &str) -> bool {
        hash_passphrase(&self.salt, passphrase) == self.passphrase_hash
    }
}

fn hash_passphrase(salt: &str, passphrase: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(passphrase.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Wallet store keeping one JSON file per wallet
pub struct FileWalletStore {
    wallets_dir: PathBuf,
    name_pattern: Regex,
}

impl FileWalletStore {
    /// Open the store under `home`, creating its directory if needed
    pub fn initialise(home: &Path) -> Result<Self> {
        let wallets_dir = home.join("wallets");
        std::fs::create_dir_all(&wallets_dir).map_err(|e| {
            Error::Io(format!(
                "Failed to create {}: {}",
                wallets_dir.display(),
                e
            ))
        })?;

        let name_pattern = Regex::new(WALLET_NAME_PATTERN)
            .map_err(|e| Error::Config(format!("Invalid wallet name pattern: {}", e)))?;

        debug!("Wallet store opened at {}", wallets_dir.display());

        Ok(Self {
            wallets_dir,
            name_pattern,
        })
    }

    /// Register a new wallet protected by `passphrase`
    pub fn create_wallet(&self, name: &str, passphrase: &str) -> Result<WalletSummary> {
        self.validate_name(name)?;

        let path = self.wallet_path(name);
        if path.exists() {
            return Err(Error::WalletAlreadyExists(name.to_string()));
        }

        let record = WalletRecord::new(name, passphrase);
        let json = serde_json::to_string_pretty(&record)?;
        std::fs::write(&path, json)
            .map_err(|e| Error::Io(format!("Failed to write {}: {}", path.display(), e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }

        info!("Created wallet {}", name);
        Ok(WalletSummary {
            name: record.name,
            created_at: record.created_at,
        })
    }

    fn validate_name(&self, name: &str) -> Result<()> {
        if self.name_pattern.is_match(name) {
            Ok(())
        } else {
            Err(Error::InvalidWalletName(format!(
                "{:?} must match {}",
                name, WALLET_NAME_PATTERN
            )))
        }
    }

    fn wallet_path(&self, name: &str) -> PathBuf {
        self.wallets_dir.join(format!("{}.json", name))
    }

    fn read_record(&self, name: &str) -> Result<WalletRecord> {
        if self.validate_name(name).is_err() {
            return Err(Error::WalletNotFound(name.to_string()));
        }

        let path = self.wallet_path(name);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::WalletNotFound(name.to_string()))
            }
            Err(e) => {
                return Err(Error::Io(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        serde_json::from_str(&content).map_err(|e| {
            Error::Serialization(format!("Failed to parse wallet {}: {}", name, e))
        })
    }
}

#[async_trait]
impl WalletStore for FileWalletStore {
    async fn list_wallets(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.wallets_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    async fn unlock(&self, name: &str, passphrase: &str) -> Result<WalletSummary> {
        let record = self.read_record(name)?;
        if !record.matches(passphrase) {
            return Err(Error::WrongPassphrase);
        }

        Ok(WalletSummary {
            name: record.name,
            created_at: record.created_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_create_and_unlock() {
        let dir = tempdir().unwrap();
        let store = FileWalletStore::initialise(dir.path()).unwrap();

        store.create_wallet("trader-1", "secret").unwrap();

        let summary = store.unlock("trader-1", "secret").await.unwrap();
        assert_eq!(summary.name, "trader-1");
        assert!(matches!(
            store.unlock("trader-1", "wrong").await,
            Err(Error::WrongPassphrase)
        ));
        assert!(matches!(
            store.unlock("trader-2", "secret").await,
            Err(Error::WalletNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_wallets_sorted() {
        let dir = tempdir().unwrap();
        let store = FileWalletStore::initialise(dir.path()).unwrap();

        store.create_wallet("trader-2", "b").unwrap();
        store.create_wallet("trader-1", "a").unwrap();
        std::fs::write(dir.path().join("wallets").join("notes.txt"), "ignored").unwrap();

        assert_eq!(
            store.list_wallets().await.unwrap(),
            vec!["trader-1".to_string(), "trader-2".to_string()]
        );
    }

    #[test]
    fn test_rejects_duplicates_and_bad_names() {
        let dir = tempdir().unwrap();
        let store = FileWalletStore::initialise(dir.path()).unwrap();

        store.create_wallet("trader-1", "a").unwrap();
        assert!(matches!(
            store.create_wallet("trader-1", "b"),
            Err(Error::WalletAlreadyExists(_))
        ));
        assert!(matches!(
            store.create_wallet("../escape", "a"),
            Err(Error::InvalidWalletName(_))
        ));
        assert!(matches!(
            store.create_wallet("", "a"),
            Err(Error::InvalidWalletName(_))
        ));
    }

    #[test]
    fn test_passphrase_is_salted() {
        let a = WalletRecord::new("a", "same");
        let b = WalletRecord::new("b", "same");
        assert_ne!(a.passphrase_hash, b.passphrase_hash);
        assert!(a.matches("same"));
        assert!(!a.matches("Same"));
    }
}
