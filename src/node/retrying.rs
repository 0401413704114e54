//! Node wrapper retrying transient failures
//!
//! Only errors flagged by [`is_retryable`](crate::error::Error::is_retryable) are retried, with an
//! exponential backoff, and never more than the configured number of
//! retries after the first call. A rejected transaction is returned immediately.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use tracing::{error, warn};

use super::{Node, Statistics};
use crate::error::Result;

/// Delay before the first retry
const RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

pub struct RetryingNode {
    inner: Arc<dyn Node>,
    /// First call plus the configured retries
    attempts: u64,
    base_delay: Duration,
}

impl RetryingNode {
    pub fn new(inner: Arc<dyn Node>, retries: u64) -> Self {
        Self::with_base_delay(inner, retries, RETRY_BASE_DELAY)
    }

    pub fn with_base_delay(inner: Arc<dyn Node>, retries: u64, base_delay: Duration) -> Self {
        Self {
            inner,
            attempts: retries.saturating_add(1),
            base_delay,
        }
    }

    async fn with_retries<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let backoff = ExponentialBackoff {
            initial_interval: self.base_delay,
            max_interval: self.base_delay * 8,
            max_elapsed_time: None,
            ..Default::default()
        };

        let attempt = AtomicU64::new(0);
        let attempt = &attempt;
        let call = &call;
        let host = self.inner.host();
        let max_attempts = self.attempts;

        retry(backoff, || async move {
            let current = attempt.fetch_add(1, Ordering::Relaxed) + 1;
            match call().await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() && current < max_attempts => {
                    warn!(
                        "{} on {} failed (attempt {}/{}): {}",
                        operation, host, current, max_attempts, e
                    );
                    Err(backoff::Error::transient(e))
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!(
                            "{} on {} failed after {} attempts: {}",
                            operation, host, current, e
                        );
                    }
                    Err(backoff::Error::permanent(e))
                }
            }
        })
        .await
    }
}

#[async_trait]
impl Node for RetryingNode {
    fn host(&self) -> &str {
        self.inner.host()
    }

    async fn statistics(&self) -> Result<Statistics> {
        self.with_retries("statistics", || self.inner.statistics())
            .await
    }

    async fn send_transaction(&self, payload: &[u8]) -> Result<String> {
        self.with_retries("send_transaction", || self.inner.send_transaction(payload))
            .await
    }
}

/// Erase the concrete node type
pub fn retrying(inner: Arc<dyn Node>, retries: u64) -> Arc<dyn Node> {
    Arc::new(RetryingNode::new(inner, retries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::node::testing::{unreachable, ScriptedNode};

    fn fast(inner: Arc<ScriptedNode>, retries: u64) -> RetryingNode {
        RetryingNode::with_base_delay(inner, retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let inner = Arc::new(ScriptedNode::with_outcomes(
            "n1",
            true,
            vec![
                Err(unreachable("n1")),
                Err(unreachable("n1")),
                Ok("hash".to_string()),
            ],
        ));
        let node = fast(inner.clone(), 5);

        assert_eq!(node.send_transaction(b"payload").await.unwrap(), "hash");
        assert_eq!(inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let inner = Arc::new(ScriptedNode::with_outcomes(
            "n1",
            true,
            vec![Err(unreachable("n1"))],
        ));
        let node = fast(inner.clone(), 3);

        assert!(matches!(
            node.send_transaction(b"payload").await,
            Err(Error::Node { .. })
        ));
        assert_eq!(inner.calls(), 4);
    }

    #[tokio::test]
    async fn test_rejections_are_not_retried() {
        let inner = Arc::new(ScriptedNode::with_outcomes(
            "n1",
            true,
            vec![Err(Error::TransactionRejected {
                host: "n1".into(),
                reason: "invalid signature".into(),
            })],
        ));
        let node = fast(inner.clone(), 5);

        assert!(matches!(
            node.send_transaction(b"payload").await,
            Err(Error::TransactionRejected { .. })
        ));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_zero_retries_still_tries_once() {
        let inner = Arc::new(ScriptedNode::healthy("n1"));
        let node = fast(inner.clone(), 0);

        assert_eq!(node.send_transaction(b"payload").await.unwrap(), "tx-from-n1");
        assert_eq!(inner.calls(), 1);

        let failing = Arc::new(ScriptedNode::with_outcomes(
            "n2",
            true,
            vec![Err(unreachable("n2"))],
        ));
        assert!(fast(failing.clone(), 0).send_transaction(b"payload").await.is_err());
        assert_eq!(failing.calls(), 1);
    }
}
