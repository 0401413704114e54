//! Relays transactions submitted through the API v1 to a backend node

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use super::retrying::retrying;
use super::{HttpNode, Node, NODE_REQUEST_TIMEOUT};
use crate::config::NodesConfig;
use crate::error::{Error, Result};
use crate::logging::Logger;

pub struct NodeForwarder {
    log: Logger,
    nodes: Vec<Arc<dyn Node>>,
    next: AtomicUsize,
}

impl NodeForwarder {
    pub fn new(log: Logger, config: &NodesConfig) -> Result<Self> {
        let mut nodes = Vec::with_capacity(config.hosts.len());
        for host in &config.hosts {
            let node = HttpNode::new(host, NODE_REQUEST_TIMEOUT)?;
            nodes.push(retrying(Arc::new(node), config.retries));
        }
        Self::with_nodes(log, nodes)
    }

    pub fn with_nodes(log: Logger, nodes: Vec<Arc<dyn Node>>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::NoHostSpecified);
        }

        Ok(Self {
            log,
            nodes,
            next: AtomicUsize::new(0),
        })
    }

    /// Send a payload, moving to the next node when one is unreachable
    pub async fn send_tx(&self, payload: &[u8]) -> Result<String> {
        let len = self.nodes.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % len;

        for offset in 0..len {
            let node = &self.nodes[(start + offset) % len];
            match node.send_transaction(payload).await {
                Ok(tx_hash) => {
                    info!(parent: self.log.span(), host = node.host(), tx_hash = %tx_hash, "Transaction forwarded");
                    return Ok(tx_hash);
                }
                Err(e) if e.is_retryable() => {
                    warn!(parent: self.log.span(), host = node.host(), error = %e, "Couldn't forward the transaction, trying next node");
                }
                Err(e) => return Err(e),
            }
        }

        Err(Error::NoHealthyNode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::ScriptedNode;

    fn forwarder(nodes: Vec<Arc<dyn Node>>) -> NodeForwarder {
        NodeForwarder::with_nodes(Logger::root("test").named("forwarder"), nodes).unwrap()
    }

    #[tokio::test]
    async fn test_falls_through_unreachable_nodes() {
        let down = Arc::new(ScriptedNode::unhealthy("n1"));
        let up = Arc::new(ScriptedNode::healthy("n2"));
        let forwarder = forwarder(vec![down.clone() as Arc<dyn Node>, up.clone()]);

        assert_eq!(forwarder.send_tx(b"tx").await.unwrap(), "tx-from-n2");
        assert_eq!(down.calls(), 1);
        assert_eq!(up.calls(), 1);
    }

    #[tokio::test]
    async fn test_rejection_stops_forwarding() {
        let rejecting = Arc::new(ScriptedNode::with_outcomes(
            "n1",
            true,
            vec![Err(Error::TransactionRejected {
                host: "n1".into(),
                reason: "bad nonce".into(),
            })],
        ));
        let other = Arc::new(ScriptedNode::healthy("n2"));
        let forwarder = forwarder(vec![rejecting as Arc<dyn Node>, other.clone()]);

        assert!(matches!(
            forwarder.send_tx(b"tx").await,
            Err(Error::TransactionRejected { .. })
        ));
        assert_eq!(other.calls(), 0);
    }

    #[tokio::test]
    async fn test_all_nodes_down() {
        let forwarder = forwarder(vec![
            Arc::new(ScriptedNode::unhealthy("n1")),
            Arc::new(ScriptedNode::unhealthy("n2")),
        ]);
        assert!(matches!(
            forwarder.send_tx(b"tx").await,
            Err(Error::NoHealthyNode)
        ));
    }

    #[test]
    fn test_requires_hosts() {
        assert!(matches!(
            NodeForwarder::new(Logger::root("test"), &NodesConfig::default()),
            Err(Error::NoHostSpecified)
        ));
    }
}
