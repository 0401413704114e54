//! Error types for the wallet stores, nodes and service collaborators

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the collaborators consumed by the service
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("no host specified in the configuration")]
    NoHostSpecified,

    #[error("Invalid node host {host}: {reason}")]
    InvalidHost { host: String, reason: String },

    // Wallet store errors
    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Wallet already exists: {0}")]
    WalletAlreadyExists(String),

    #[error("Invalid wallet name: {0}")]
    InvalidWalletName(String),

    #[error("wrong passphrase")]
    WrongPassphrase,

    // Passphrase file errors
    #[error("couldn't read passphrase file {path}: {reason}")]
    PassphraseFile { path: String, reason: String },

    // Network store errors
    #[error("Network not found: {0}")]
    NetworkNotFound(String),

    // Service store and authentication errors
    #[error("the service is not initialised")]
    ServiceNotInitialised,

    #[error("the token has expired")]
    TokenExpired,

    #[error("the token is not recognised")]
    UnknownToken,

    // Node errors
    #[error("Node request failed on {host}: {reason}")]
    Node { host: String, reason: String },

    #[error("Node {host} rejected the transaction: {reason}")]
    TransactionRejected { host: String, reason: String },

    #[error("no healthy node available")]
    NoHealthyNode,

    // Service errors
    #[error("HTTP server error: {0}")]
    Server(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Node { .. })
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        let host = e
            .url()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        Error::Node {
            host,
            reason: e.to_string(),
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from config errors
impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Config(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_node_errors_are_retryable() {
        let node = Error::Node {
            host: "localhost".into(),
            reason: "connection refused".into(),
        };
        assert!(node.is_retryable());
        assert!(!Error::NoHealthyNode.is_retryable());
        assert!(!Error::TransactionRejected {
            host: "localhost".into(),
            reason: "bad".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_io_conversion_keeps_message() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing").into();
        assert_eq!(err.to_string(), "I/O error: missing");
    }
}
