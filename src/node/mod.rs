//! Backend node access
//!
//! ```text
//! HttpNode ─▶ RetryingNode ─┬─▶ RoundRobinSelector (client API)
//!                           └─▶ NodeForwarder      (API v1 commands)
//! ```

pub mod forwarder;
pub mod retrying;
pub mod selector;

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

pub use forwarder::NodeForwarder;
pub use retrying::RetryingNode;
pub use selector::{build_round_robin_selector_with_retrying_nodes, NodeSelector, RoundRobinSelector};

/// Timeout applied to every node request
pub const NODE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Node statistics, as reported by `GET /statistics`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    pub app_version: String,
    pub chain_id: String,
    #[serde(default)]
    pub block_height: String,
}

#[derive(Debug, Deserialize)]
struct StatisticsResponse {
    statistics: Statistics,
}

#[derive(Debug, Serialize)]
struct SubmitRawTransactionRequest {
    /// Base64 encoded payload
    tx: String,
    #[serde(rename = "type")]
    submission_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitRawTransactionResponse {
    success: bool,
    #[serde(default)]
    tx_hash: String,
    #[serde(default)]
    data: String,
}

/// A backend node
#[async_trait]
pub trait Node: Send + Sync {
    fn host(&self) -> &str;

    async fn statistics(&self) -> Result<Statistics>;

    async fn health_check(&self) -> Result<()> {
        self.statistics().await.map(|_| ())
    }

    /// Submit a payload and return its transaction hash
    async fn send_transaction(&self, payload: &[u8]) -> Result<String>;
}

/// Node reached over its REST API
pub struct HttpNode {
    host: String,
    base: Url,
    client: Client,
}

impl HttpNode {
    pub fn new(host: &str, timeout: Duration) -> Result<Self> {
        let mut base = Url::parse(host).map_err(|e| Error::InvalidHost {
            host: host.to_string(),
            reason: e.to_string(),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            host: host.to_string(),
            base,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|e| Error::InvalidHost {
            host: self.host.clone(),
            reason: e.to_string(),
        })
    }

    fn node_error(&self, reason: impl ToString) -> Error {
        Error::Node {
            host: self.host.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl Node for HttpNode {
    fn host(&self) -> &str {
        &self.host
    }

    async fn statistics(&self) -> Result<Statistics> {
        let url = self.endpoint("statistics")?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.node_error(e))?;

        if !response.status().is_success() {
            return Err(self.node_error(format!("statistics returned {}", response.status())));
        }

        let body: StatisticsResponse = response
            .json()
            .await
            .map_err(|e| self.node_error(format!("invalid statistics: {}", e)))?;
        Ok(body.statistics)
    }

    async fn send_transaction(&self, payload: &[u8]) -> Result<String> {
        let url = self.endpoint("transaction/raw")?;
        let request = SubmitRawTransactionRequest {
            tx: base64::engine::general_purpose::STANDARD.encode(payload),
            submission_type: "TYPE_SYNC",
        };
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.node_error(e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(self.node_error(format!("transaction submission returned {}", status)));
        }
        if !status.is_success() {
            let reason = response.text().await.unwrap_or_default();
            return Err(Error::TransactionRejected {
                host: self.host.clone(),
                reason: format!("{}: {}", status, reason),
            });
        }

        let body: SubmitRawTransactionResponse = response
            .json()
            .await
            .map_err(|e| self.node_error(format!("invalid submission response: {}", e)))?;

        if !body.success {
            return Err(Error::TransactionRejected {
                host: self.host.clone(),
                reason: body.data,
            });
        }
        Ok(body.tx_hash)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted nodes for selector and forwarder tests

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Node answering from a script of outcomes, the last one repeating
    pub struct ScriptedNode {
        pub host: String,
        healthy: bool,
        outcomes: Mutex<Vec<std::result::Result<String, Error>>>,
        pub calls: AtomicUsize,
    }

    impl ScriptedNode {
        pub fn healthy(host: &str) -> Self {
            Self::with_outcomes(host, true, vec![Ok(format!("tx-from-{}", host))])
        }

        pub fn unhealthy(host: &str) -> Self {
            Self::with_outcomes(host, false, vec![Err(unreachable(host))])
        }

        pub fn with_outcomes(
            host: &str,
            healthy: bool,
            outcomes: Vec<std::result::Result<String, Error>>,
        ) -> Self {
            Self {
                host: host.to_string(),
                healthy,
                outcomes: Mutex::new(outcomes),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    pub fn unreachable(host: &str) -> Error {
        Error::Node {
            host: host.to_string(),
            reason: "connection refused".to_string(),
        }
    }

    fn clone_outcome(outcome: &std::result::Result<String, Error>) -> std::result::Result<String, Error> {
        match outcome {
            Ok(hash) => Ok(hash.clone()),
            Err(Error::Node { host, reason }) => Err(Error::Node {
                host: host.clone(),
                reason: reason.clone(),
            }),
            Err(Error::TransactionRejected { host, reason }) => Err(Error::TransactionRejected {
                host: host.clone(),
                reason: reason.clone(),
            }),
            Err(other) => Err(Error::Server(other.to_string())),
        }
    }

    #[async_trait]
    impl Node for ScriptedNode {
        fn host(&self) -> &str {
            &self.host
        }

        async fn statistics(&self) -> Result<Statistics> {
            if self.healthy {
                Ok(Statistics {
                    app_version: crate::network::CLIENT_VERSION.to_string(),
                    chain_id: "test-chain".to_string(),
                    block_height: "1".to_string(),
                })
            } else {
                Err(unreachable(&self.host))
            }
        }

        async fn send_transaction(&self, _payload: &[u8]) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut outcomes = self.outcomes.lock().unwrap();
            if outcomes.len() > 1 {
                outcomes.remove(0)
            } else {
                clone_outcome(&outcomes[0])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_node_endpoints() {
        let node = HttpNode::new("http://localhost:3008", NODE_REQUEST_TIMEOUT).unwrap();
        assert_eq!(
            node.endpoint("statistics").unwrap().as_str(),
            "http://localhost:3008/statistics"
        );

        let nested = HttpNode::new("https://node.example/api", NODE_REQUEST_TIMEOUT).unwrap();
        assert_eq!(
            nested.endpoint("transaction/raw").unwrap().as_str(),
            "https://node.example/api/transaction/raw"
        );
    }

    #[test]
    fn test_http_node_rejects_invalid_host() {
        assert!(matches!(
            HttpNode::new("not a url", NODE_REQUEST_TIMEOUT),
            Err(Error::InvalidHost { .. })
        ));
    }

    #[test]
    fn test_statistics_shape() {
        let json = r#"{"statistics":{"appVersion":"v0.1.0","chainId":"testnet-001","blockHeight":"42"}}"#;
        let parsed: StatisticsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.statistics.chain_id, "testnet-001");
        assert_eq!(parsed.statistics.app_version, "v0.1.0");
    }
}
