//! Network version compatibility

use std::time::Duration;

use async_trait::async_trait;
use futures::future::select_ok;

use crate::error::{Error, Result};
use crate::node::{HttpNode, Node};

/// Network version this software has been built against
pub const CLIENT_VERSION: &str = concat!("v", env!("CARGO_PKG_VERSION"));

/// Asks the network which version it runs
#[async_trait]
pub trait VersionProbe: Send + Sync {
    async fn network_version(&self, hosts: &[String]) -> Result<String>;
}

/// Queries every host concurrently and keeps the first answer
pub struct HttpVersionProbe {
    timeout: Duration,
}

impl HttpVersionProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for HttpVersionProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl VersionProbe for HttpVersionProbe {
    async fn network_version(&self, hosts: &[String]) -> Result<String> {
        if hosts.is_empty() {
            return Err(Error::NoHostSpecified);
        }

        let mut queries = Vec::with_capacity(hosts.len());
        for host in hosts {
            let node = HttpNode::new(host, self.timeout)?;
            queries.push(Box::pin(async move {
                node.statistics().await.map(|s| s.app_version)
            }));
        }

        let (version, _) = select_ok(queries).await?;
        Ok(version)
    }
}

/// Whether the client and the network versions are compatible
pub fn is_compatible(network_version: &str) -> bool {
    network_version == CLIENT_VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_version_is_prefixed() {
        assert!(CLIENT_VERSION.starts_with('v'));
        assert!(is_compatible(CLIENT_VERSION));
        assert!(!is_compatible("v0.0.0-unknown"));
    }

    #[tokio::test]
    async fn test_no_hosts_is_an_error() {
        let probe = HttpVersionProbe::default();
        assert!(matches!(
            probe.network_version(&[]).await,
            Err(Error::NoHostSpecified)
        ));
    }
}
