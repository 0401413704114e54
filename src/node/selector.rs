//! Node selection for the client API

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::retrying::retrying;
use super::{HttpNode, Node, NODE_REQUEST_TIMEOUT};
use crate::error::{Error, Result};
use crate::logging::Logger;

/// Picks the node an outbound call goes to
#[async_trait]
pub trait NodeSelector: Send + Sync {
    async fn node(&self) -> Result<Arc<dyn Node>>;
}

/// Rotates across nodes, skipping the unhealthy ones
pub struct RoundRobinSelector {
    log: Logger,
    nodes: Vec<Arc<dyn Node>>,
    next: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new(log: Logger, nodes: Vec<Arc<dyn Node>>) -> Result<Self> {
        if nodes.is_empty() {
            return Err(Error::NoHostSpecified);
        }

        Ok(Self {
            log,
            nodes,
            next: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl NodeSelector for RoundRobinSelector {
    async fn node(&self) -> Result<Arc<dyn Node>> {
        let len = self.nodes.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed) % len;

        for offset in 0..len {
            let node = &self.nodes[(start + offset) % len];
            match node.health_check().await {
                Ok(()) => {
                    debug!(parent: self.log.span(), host = node.host(), "Selected node");
                    return Ok(Arc::clone(node));
                }
                Err(e) => {
                    warn!(parent: self.log.span(), host = node.host(), error = %e, "Skipping unhealthy node");
                }
            }
        }

        Err(Error::NoHealthyNode)
    }
}

/// Build a round-robin selector over HTTP nodes, each retrying up to `retries` times
pub fn build_round_robin_selector_with_retrying_nodes(
    log: Logger,
    hosts: &[String],
    retries: u64,
) -> Result<RoundRobinSelector> {
    let mut nodes = Vec::with_capacity(hosts.len());
    for host in hosts {
        let node = HttpNode::new(host, NODE_REQUEST_TIMEOUT)?;
        nodes.push(retrying(Arc::new(node), retries));
    }
    RoundRobinSelector::new(log, nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::testing::ScriptedNode;

    fn selector(nodes: Vec<Arc<dyn Node>>) -> RoundRobinSelector {
        RoundRobinSelector::new(Logger::root("test").named("selector"), nodes).unwrap()
    }

    #[tokio::test]
    async fn test_rotates_across_healthy_nodes() {
        let selector = selector(vec![
            Arc::new(ScriptedNode::healthy("n1")),
            Arc::new(ScriptedNode::healthy("n2")),
            Arc::new(ScriptedNode::healthy("n3")),
        ]);

        let mut picked = Vec::new();
        for _ in 0..4 {
            picked.push(selector.node().await.unwrap().host().to_string());
        }
        assert_eq!(picked, vec!["n1", "n2", "n3", "n1"]);
    }

    #[tokio::test]
    async fn test_skips_unhealthy_nodes() {
        let selector = selector(vec![
            Arc::new(ScriptedNode::unhealthy("n1")),
            Arc::new(ScriptedNode::healthy("n2")),
        ]);

        assert_eq!(selector.node().await.unwrap().host(), "n2");
        assert_eq!(selector.node().await.unwrap().host(), "n2");
    }

    #[tokio::test]
    async fn test_no_healthy_node() {
        let selector = selector(vec![
            Arc::new(ScriptedNode::unhealthy("n1")),
            Arc::new(ScriptedNode::unhealthy("n2")),
        ]);

        assert!(matches!(selector.node().await, Err(Error::NoHealthyNode)));
    }

    #[test]
    fn test_requires_hosts() {
        let log = Logger::root("test");
        assert!(matches!(
            RoundRobinSelector::new(log.clone(), Vec::new()),
            Err(Error::NoHostSpecified)
        ));
        assert!(matches!(
            build_round_robin_selector_with_retrying_nodes(log, &[], 3),
            Err(Error::NoHostSpecified)
        ));
    }

    #[test]
    fn test_builder_rejects_invalid_host() {
        let hosts = vec![
            "http://localhost:3008".to_string(),
            "not a url".to_string(),
        ];
        assert!(matches!(
            build_round_robin_selector_with_retrying_nodes(Logger::root("test"), &hosts, 3),
            Err(Error::InvalidHost { .. })
        ));
        assert!(build_round_robin_selector_with_retrying_nodes(
            Logger::root("test"),
            &hosts[..1],
            3
        )
        .is_ok());
    }
}
