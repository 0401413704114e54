//! Command flags and their validation

use std::fs;
use std::path::{Path, PathBuf};

use clap::Args;
use thiserror::Error;

use crate::bootstrap::BootstrapRequest;
use crate::error::{Error, Result};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FlagError {
    #[error("{0} must be specified")]
    MustBeSpecified(&'static str),
}

/// Flags of `service run`
#[derive(Args, Debug, Clone)]
pub struct RunServiceFlags {
    /// Network configuration to use
    #[arg(short, long, default_value = "")]
    pub network: String,

    /// The wallet to use
    #[arg(short, long, default_value = "")]
    pub wallet: String,

    /// The wallet's passphrase
    #[arg(short, long, default_value = "")]
    pub passphrase_file: String,

    /// The minimum log level to display
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// The format of the logs on the standard output: [console, json]
    #[arg(long, default_value = "console")]
    pub log_format: String,
}

impl RunServiceFlags {
    pub fn validate(&self) -> std::result::Result<(), FlagError> {
        if self.network.is_empty() {
            return Err(FlagError::MustBeSpecified("network"));
        }
        if self.wallet.is_empty() {
            return Err(FlagError::MustBeSpecified("wallet"));
        }
        if self.passphrase_file.is_empty() {
            return Err(FlagError::MustBeSpecified("passphrase-file"));
        }
        Ok(())
    }

    pub fn bootstrap_request(&self) -> BootstrapRequest {
        BootstrapRequest {
            network: self.network.clone(),
            wallet: self.wallet.clone(),
            passphrase_file: PathBuf::from(&self.passphrase_file),
        }
    }
}

/// Read a passphrase, dropping the trailing line break
pub fn read_passphrase_file(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path).map_err(|e| Error::PassphraseFile {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let passphrase = raw.trim_end_matches(['\r', '\n']);
    if passphrase.is_empty() {
        return Err(Error::PassphraseFile {
            path: path.display().to_string(),
            reason: "the file is empty".to_string(),
        });
    }
    Ok(passphrase.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn flags() -> RunServiceFlags {
        RunServiceFlags {
            network: "local".into(),
            wallet: "trader-1".into(),
            passphrase_file: "passphrase.txt".into(),
            log_level: "info".into(),
            log_format: "console".into(),
        }
    }

    #[test]
    fn test_validate_required_flags() {
        assert_eq!(flags().validate(), Ok(()));

        let missing_network = RunServiceFlags {
            network: String::new(),
            ..flags()
        };
        assert_eq!(
            missing_network.validate().unwrap_err().to_string(),
            "network must be specified"
        );

        let missing_wallet = RunServiceFlags {
            wallet: String::new(),
            ..flags()
        };
        assert_eq!(
            missing_wallet.validate(),
            Err(FlagError::MustBeSpecified("wallet"))
        );

        let missing_passphrase = RunServiceFlags {
            passphrase_file: String::new(),
            ..flags()
        };
        assert_eq!(
            missing_passphrase.validate(),
            Err(FlagError::MustBeSpecified("passphrase-file"))
        );
    }

    #[test]
    fn test_read_passphrase_file() {
        let dir = tempdir().unwrap();

        let path = dir.path().join("passphrase.txt");
        fs::write(&path, "secret phrase\r\n").unwrap();
        assert_eq!(read_passphrase_file(&path).unwrap(), "secret phrase");

        let empty = dir.path().join("empty.txt");
        fs::write(&empty, "\n").unwrap();
        assert!(matches!(
            read_passphrase_file(&empty),
            Err(Error::PassphraseFile { .. })
        ));

        assert!(matches!(
            read_passphrase_file(&dir.path().join("missing.txt")),
            Err(Error::PassphraseFile { .. })
        ));
    }
}
