//! Consent policy for transactions submitted through the API v1

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::Result;
use crate::logging::Logger;

#[derive(Debug, Clone)]
pub struct ConsentRequest {
    pub tx_id: String,
    pub wallet: String,
    pub public_key: String,
    pub digest: String,
    pub received_at: DateTime<Utc>,
}

#[async_trait]
pub trait ConsentPolicy: Send + Sync {
    /// Decide whether the transaction may be sent
    async fn ask(&self, request: &ConsentRequest) -> Result<bool>;
}

/// Approves every transaction
pub struct AutomaticConsentPolicy {
    log: Logger,
}

impl AutomaticConsentPolicy {
    pub fn new(log: Logger) -> Self {
        Self { log }
    }
}

#[async_trait]
impl ConsentPolicy for AutomaticConsentPolicy {
    async fn ask(&self, request: &ConsentRequest) -> Result<bool> {
        info!(
            parent: self.log.span(),
            tx_id = %request.tx_id,
            wallet = %request.wallet,
            digest = %request.digest,
            "Transaction automatically approved"
        );
        Ok(true)
    }
}
