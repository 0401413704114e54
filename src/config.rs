//! Network configuration loading and validation

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Prefix of the environment variables overriding a network file
pub const NETWORK_ENV_PREFIX: &str = "WALLET_DUMMY_NETWORK";

/// Configuration of a network the service connects to
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    /// Address the HTTP service listens on
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Lifetime of the tokens issued by the API v1 authentication
    #[serde(default = "default_token_expiry_secs")]
    pub token_expiry_secs: u64,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub nodes: NodesConfig,
}

/// Backend nodes reachable for this network
#[derive(Debug, Clone, Deserialize)]
pub struct NodesConfig {
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Retries per node after a failed call, before moving to the next one
    #[serde(default = "default_retries")]
    pub retries: u64,
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            retries: default_retries(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    1789
}

fn default_token_expiry_secs() -> u64 {
    7 * 24 * 3600
}

/// Longest token lifetime accepted, ten years
pub const MAX_TOKEN_EXPIRY_SECS: u64 = 10 * 365 * 24 * 3600;

fn default_retries() -> u64 {
    5
}

impl NetworkConfig {
    /// Load a network file, applying defaults and environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            .set_default("host", default_host())?
            .set_default("port", default_port() as i64)?
            .set_default("token_expiry_secs", default_token_expiry_secs() as i64)?
            .set_default("api.nodes.retries", default_retries() as i64)?
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(NETWORK_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("api.nodes.hosts"),
            )
            .build()
            .map_err(|e| {
                Error::Config(format!(
                    "Failed to build network configuration from {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let config: NetworkConfig = settings.try_deserialize().map_err(|e| {
            Error::Config(format!(
                "Failed to deserialize network configuration {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("network name cannot be empty".into()));
        }

        if self.port == 0 {
            return Err(Error::Config("port must be greater than 0".into()));
        }

        if self.token_expiry_secs == 0 {
            return Err(Error::Config(
                "token_expiry_secs must be greater than 0".into(),
            ));
        }

        if self.token_expiry_secs > MAX_TOKEN_EXPIRY_SECS {
            return Err(Error::Config(format!(
                "token_expiry_secs cannot exceed {}",
                MAX_TOKEN_EXPIRY_SECS
            )));
        }

        Ok(())
    }

    /// Ensure the configuration holds enough to reach a backend node
    pub fn ensure_can_connect_node(&self) -> Result<()> {
        if self.api.nodes.hosts.is_empty() {
            return Err(Error::NoHostSpecified);
        }

        for host in &self.api.nodes.hosts {
            let url = url::Url::parse(host).map_err(|e| Error::InvalidHost {
                host: host.clone(),
                reason: e.to_string(),
            })?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(Error::InvalidHost {
                    host: host.clone(),
                    reason: format!("unsupported scheme {:?}", url.scheme()),
                });
            }
        }

        Ok(())
    }

    pub fn token_expiry(&self) -> Duration {
        Duration::from_secs(self.token_expiry_secs)
    }

    /// Address the HTTP service binds to
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn service_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        let hosts: Vec<String> = self.api.nodes.hosts.iter().map(|h| mask_url(h)).collect();
        format!(
            r#"Network {}:
  Service:
    url: {}
    token_expiry: {}s
  Nodes:
    hosts: {:?}
    retries: {}
"#,
            self.name,
            self.service_url(),
            self.token_expiry_secs,
            hosts,
            self.api.nodes.retries,
        )
    }
}

/// Mask URL for display (hide API keys in query params)
fn mask_url(url: &str) -> String {
    if let Some(idx) = url.find('?') {
        format!("{}?***", &url[..idx])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_network(dir: &Path, body: &str) -> std::path::PathBuf {
        let path = dir.join("local.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_load_applies_defaults() {
        let dir = tempdir().unwrap();
        let path = write_network(
            dir.path(),
            r#"
name = "local"

[api.nodes]
hosts = ["http://localhost:3008"]
"#,
        );

        let cfg = NetworkConfig::load(&path).unwrap();
        assert_eq!(cfg.name, "local");
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 1789);
        assert_eq!(cfg.api.nodes.retries, 5);
        assert_eq!(cfg.token_expiry(), Duration::from_secs(604800));
        assert_eq!(cfg.service_url(), "http://127.0.0.1:1789");
        assert!(cfg.ensure_can_connect_node().is_ok());
    }

    #[test]
    fn test_load_rejects_zero_port() {
        let dir = tempdir().unwrap();
        let path = write_network(dir.path(), "name = \"local\"\nport = 0\n");
        assert!(NetworkConfig::load(&path).is_err());
    }

    #[test]
    fn test_load_rejects_unbounded_token_expiry() {
        let dir = tempdir().unwrap();
        let path = write_network(
            dir.path(),
            "name = \"local\"\ntoken_expiry_secs = 1000000000000000\n",
        );
        assert!(matches!(NetworkConfig::load(&path), Err(Error::Config(_))));

        let path = write_network(
            dir.path(),
            &format!("name = \"local\"\ntoken_expiry_secs = {}\n", MAX_TOKEN_EXPIRY_SECS),
        );
        assert!(NetworkConfig::load(&path).is_ok());
    }

    #[test]
    fn test_missing_hosts_cannot_connect() {
        let dir = tempdir().unwrap();
        let path = write_network(dir.path(), "name = \"local\"\n");
        let cfg = NetworkConfig::load(&path).unwrap();
        assert!(matches!(
            cfg.ensure_can_connect_node(),
            Err(Error::NoHostSpecified)
        ));
    }

    #[test]
    fn test_invalid_host_cannot_connect() {
        let dir = tempdir().unwrap();
        let path = write_network(
            dir.path(),
            "name = \"local\"\n[api.nodes]\nhosts = [\"grpc://node:3007\"]\n",
        );
        let cfg = NetworkConfig::load(&path).unwrap();
        assert!(matches!(
            cfg.ensure_can_connect_node(),
            Err(Error::InvalidHost { .. })
        ));
    }

    #[test]
    fn test_masked_display_hides_query() {
        let dir = tempdir().unwrap();
        let path = write_network(
            dir.path(),
            "name = \"local\"\n[api.nodes]\nhosts = [\"https://node.example?api-key=secret\"]\n",
        );
        let cfg = NetworkConfig::load(&path).unwrap();
        let display = cfg.masked_display();
        assert!(display.contains("https://node.example?***"));
        assert!(!display.contains("secret"));
    }
}
