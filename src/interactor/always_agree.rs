//! Interactor that approves everything on behalf of one configured wallet
//!
//! INSECURE BY DESIGN. FOR DEVELOPMENT AND TESTING ONLY.
//!
//! Every request carrying a wallet name is refused when that name is not the
//! configured one, so the automation never acts for an unexpected wallet.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use super::{
    ConnectionApproval, ConsentError, ErrorType, Interactor, LogType, Permissions,
    SelectedWallet, TraceId,
};
use crate::logging::Logger;

/// Stateless consent policy bound to a single wallet
pub struct AlwaysAgreeInteractor {
    log: Logger,
    configured_wallet: String,
    wallet_passphrase: String,
}

impl AlwaysAgreeInteractor {
    pub fn new(log: Logger, configured_wallet: String, wallet_passphrase: String) -> Self {
        Self {
            log,
            configured_wallet,
            wallet_passphrase,
        }
    }

    fn ensure_configured_wallet(
        &self,
        operation: &str,
        trace_id: &TraceId,
        wallet: &str,
    ) -> Result<(), ConsentError> {
        if wallet == self.configured_wallet {
            return Ok(());
        }

        error!(
            parent: self.log.span(),
            trace_id = %trace_id,
            configured_wallet = %self.configured_wallet,
            requested_wallet = %wallet,
            "{} has been called with a different wallet than the one configured, using different wallet is not supported",
            operation
        );
        Err(ConsentError::IdentityMismatch {
            configured: self.configured_wallet.clone(),
            requested: wallet.to_string(),
        })
    }
}

#[async_trait]
impl Interactor for AlwaysAgreeInteractor {
    async fn notify_interaction_session_began(
        &self,
        trace_id: &TraceId,
    ) -> Result<(), ConsentError> {
        info!(parent: self.log.span(), trace_id = %trace_id, "NotifyInteractionSessionBegan does nothing");
        Ok(())
    }

    async fn notify_interaction_session_ended(&self, trace_id: &TraceId) {
        debug!(parent: self.log.span(), trace_id = %trace_id, "NotifyInteractionSessionEnded does nothing");
    }

    async fn notify_successful_transaction(
        &self,
        trace_id: &TraceId,
        tx_hash: &str,
        sent_at: DateTime<Utc>,
    ) {
        debug!(
            parent: self.log.span(),
            trace_id = %trace_id,
            tx_hash,
            sent_at = %sent_at.to_rfc3339(),
            "NotifySuccessfulTransaction does nothing"
        );
    }

    async fn notify_failed_transaction(
        &self,
        trace_id: &TraceId,
        cause: &str,
        sent_at: DateTime<Utc>,
    ) {
        debug!(
            parent: self.log.span(),
            trace_id = %trace_id,
            error = cause,
            sent_at = %sent_at.to_rfc3339(),
            "NotifyFailedTransaction does nothing"
        );
    }

    async fn notify_successful_request(&self, trace_id: &TraceId, message: &str) {
        debug!(parent: self.log.span(), trace_id = %trace_id, message, "NotifySuccessfulRequest does nothing");
    }

    async fn notify_error(&self, trace_id: &TraceId, error_type: ErrorType, error: &str) {
        debug!(
            parent: self.log.span(),
            trace_id = %trace_id,
            error_type = %error_type,
            error,
            "NotifyError does nothing"
        );
    }

    async fn log(&self, trace_id: &TraceId, log_type: LogType, message: &str) {
        debug!(
            parent: self.log.span(),
            trace_id = %trace_id,
            log_type = %log_type,
            message,
            "Log does nothing"
        );
    }

    async fn request_wallet_connection_review(
        &self,
        trace_id: &TraceId,
        hostname: &str,
    ) -> Result<ConnectionApproval, ConsentError> {
        debug!(parent: self.log.span(), trace_id = %trace_id, hostname, "RequestWalletConnectionReview called");
        info!(
            parent: self.log.span(),
            trace_id = %trace_id,
            hostname,
            "RequestWalletConnectionReview approves the connection request only this time"
        );
        Ok(ConnectionApproval::ApprovedOnlyThisTime)
    }

    async fn request_wallet_selection(
        &self,
        trace_id: &TraceId,
        hostname: &str,
        available_wallets: &[String],
    ) -> Result<SelectedWallet, ConsentError> {
        debug!(
            parent: self.log.span(),
            trace_id = %trace_id,
            hostname,
            wallets = ?available_wallets,
            "RequestWalletSelection called"
        );

        if !available_wallets.iter().any(|w| *w == self.configured_wallet) {
            error!(
                parent: self.log.span(),
                trace_id = %trace_id,
                wallets = ?available_wallets,
                configured_wallet = %self.configured_wallet,
                "RequestWalletSelection has been called with a selection that does not contain the configured wallet, verify you configured an existing wallet"
            );
            return Err(ConsentError::SelectionMismatch {
                configured: self.configured_wallet.clone(),
            });
        }

        info!(
            parent: self.log.span(),
            trace_id = %trace_id,
            wallet = %self.configured_wallet,
            "RequestWalletSelection selects the configured wallet"
        );
        Ok(SelectedWallet {
            wallet: self.configured_wallet.clone(),
            passphrase: self.wallet_passphrase.clone(),
        })
    }

    async fn request_passphrase(
        &self,
        trace_id: &TraceId,
        wallet: &str,
    ) -> Result<String, ConsentError> {
        debug!(parent: self.log.span(), trace_id = %trace_id, wallet, "RequestPassphrase called");
        self.ensure_configured_wallet("RequestPassphrase", trace_id, wallet)?;

        info!(parent: self.log.span(), trace_id = %trace_id, wallet, "RequestPassphrase returns the passphrase");
        Ok(self.wallet_passphrase.clone())
    }

    async fn request_permissions_review(
        &self,
        trace_id: &TraceId,
        hostname: &str,
        wallet: &str,
        permissions: &Permissions,
    ) -> Result<bool, ConsentError> {
        debug!(
            parent: self.log.span(),
            trace_id = %trace_id,
            hostname,
            permissions = ?permissions,
            "RequestPermissionsReview called"
        );
        self.ensure_configured_wallet("RequestPermissionsReview", trace_id, wallet)?;

        info!(
            parent: self.log.span(),
            trace_id = %trace_id,
            hostname,
            wallet,
            permissions = ?permissions,
            "RequestPermissionsReview approves the permissions"
        );
        Ok(true)
    }

    async fn request_transaction_review_for_sending(
        &self,
        trace_id: &TraceId,
        hostname: &str,
        wallet: &str,
        public_key: &str,
        _digest: &str,
        _received_at: DateTime<Utc>,
    ) -> Result<bool, ConsentError> {
        debug!(
            parent: self.log.span(),
            trace_id = %trace_id,
            hostname,
            public_key,
            "RequestTransactionReviewForSending called"
        );
        self.ensure_configured_wallet("RequestTransactionReviewForSending", trace_id, wallet)?;

        info!(parent: self.log.span(), trace_id = %trace_id, "RequestTransactionReviewForSending approves the transaction sending");
        Ok(true)
    }

    async fn request_transaction_review_for_signing(
        &self,
        trace_id: &TraceId,
        hostname: &str,
        wallet: &str,
        public_key: &str,
        _transaction: &str,
        _received_at: DateTime<Utc>,
    ) -> Result<bool, ConsentError> {
        debug!(
            parent: self.log.span(),
            trace_id = %trace_id,
            hostname,
            public_key,
            "RequestTransactionReviewForSigning called"
        );
        self.ensure_configured_wallet("RequestTransactionReviewForSigning", trace_id, wallet)?;

        info!(parent: self.log.span(), trace_id = %trace_id, "RequestTransactionReviewForSigning approves the transaction signing");
        Ok(true)
    }
}
