//! Interaction protocol between the client API and the wallet user
//!
//! The client API calls an [`Interactor`] whenever a connected application
//! needs a decision a human would normally take: approving a connection,
//! picking a wallet, typing a passphrase, granting permissions or reviewing
//! a transaction. Notifications report the outcome of a request and never
//! fail.
//!
//! ```text
//! ClientApi ──(trace id)──▶ Interactor ──▶ decision | ConsentError
//! ```

pub mod always_agree;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use always_agree::AlwaysAgreeInteractor;

/// Permissions requested by an application, e.g. `public_keys -> read`
pub type Permissions = BTreeMap<String, String>;

/// Correlates every call belonging to one interaction session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(String);

impl TraceId {
    /// Generate a fresh trace ID for a new session
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TraceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Answer to a connection review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionApproval {
    /// Approved for this session only
    ApprovedOnlyThisTime,
    RejectedOnlyThisTime,
}

impl ConnectionApproval {
    pub fn is_approved(&self) -> bool {
        matches!(self, ConnectionApproval::ApprovedOnlyThisTime)
    }
}

impl fmt::Display for ConnectionApproval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionApproval::ApprovedOnlyThisTime => write!(f, "APPROVED_ONLY_THIS_TIME"),
            ConnectionApproval::RejectedOnlyThisTime => write!(f, "REJECTED_ONLY_THIS_TIME"),
        }
    }
}

/// Wallet picked during a wallet selection
#[derive(Clone, PartialEq, Eq)]
pub struct SelectedWallet {
    pub wallet: String,
    pub passphrase: String,
}

impl fmt::Debug for SelectedWallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedWallet")
            .field("wallet", &self.wallet)
            .field("passphrase", &"***")
            .finish()
    }
}

/// Category of an error reported through [`Interactor::notify_error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// The application sent an invalid request
    Application,
    /// The user (here: the consent policy) refused the request
    User,
    /// Something failed inside the wallet or the network
    Internal,
    Network,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorType::Application => write!(f, "Application Error"),
            ErrorType::User => write!(f, "User Error"),
            ErrorType::Internal => write!(f, "Internal Error"),
            ErrorType::Network => write!(f, "Network Error"),
        }
    }
}

/// Category of a message reported through [`Interactor::log`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogType::Info => write!(f, "Info"),
            LogType::Warning => write!(f, "Warning"),
            LogType::Error => write!(f, "Error"),
            LogType::Success => write!(f, "Success"),
        }
    }
}

/// Refusals raised by an interactor bound to a single wallet
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsentError {
    #[error("the wallet selection doesn't contain the configured one (configured: {configured})")]
    SelectionMismatch { configured: String },

    #[error("the requested wallet doesn't match with the configured one (configured: {configured}, requested: {requested})")]
    IdentityMismatch {
        configured: String,
        requested: String,
    },
}

/// The interaction protocol
///
/// Implementations must be shareable across concurrent sessions.
#[async_trait]
pub trait Interactor: Send + Sync {
    async fn notify_interaction_session_began(&self, trace_id: &TraceId)
        -> Result<(), ConsentError>;

    async fn notify_interaction_session_ended(&self, trace_id: &TraceId);

    async fn notify_successful_transaction(
        &self,
        trace_id: &TraceId,
        tx_hash: &str,
        sent_at: DateTime<Utc>,
    );

    async fn notify_failed_transaction(
        &self,
        trace_id: &TraceId,
        cause: &str,
        sent_at: DateTime<Utc>,
    );

    async fn notify_successful_request(&self, trace_id: &TraceId, message: &str);

    async fn notify_error(&self, trace_id: &TraceId, error_type: ErrorType, error: &str);

    async fn log(&self, trace_id: &TraceId, log_type: LogType, message: &str);

    async fn request_wallet_connection_review(
        &self,
        trace_id: &TraceId,
        hostname: &str,
    ) -> Result<ConnectionApproval, ConsentError>;

    async fn request_wallet_selection(
        &self,
        trace_id: &TraceId,
        hostname: &str,
        available_wallets: &[String],
    ) -> Result<SelectedWallet, ConsentError>;

    async fn request_passphrase(
        &self,
        trace_id: &TraceId,
        wallet: &str,
    ) -> Result<String, ConsentError>;

    async fn request_permissions_review(
        &self,
        trace_id: &TraceId,
        hostname: &str,
        wallet: &str,
        permissions: &Permissions,
    ) -> Result<bool, ConsentError>;

    /// `digest` identifies the payload about to be sent
    async fn request_transaction_review_for_sending(
        &self,
        trace_id: &TraceId,
        hostname: &str,
        wallet: &str,
        public_key: &str,
        digest: &str,
        received_at: DateTime<Utc>,
    ) -> Result<bool, ConsentError>;

    async fn request_transaction_review_for_signing(
        &self,
        trace_id: &TraceId,
        hostname: &str,
        wallet: &str,
        public_key: &str,
        transaction: &str,
        received_at: DateTime<Utc>,
    ) -> Result<bool, ConsentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selected_wallet_debug_masks_passphrase() {
        let selected = SelectedWallet {
            wallet: "trader-1".into(),
            passphrase: "hunter2".into(),
        };
        let debug = format!("{:?}", selected);
        assert!(debug.contains("trader-1"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_connection_approval_wire_name() {
        let json = serde_json::to_string(&ConnectionApproval::ApprovedOnlyThisTime).unwrap();
        assert_eq!(json, r#""APPROVED_ONLY_THIS_TIME""#);
        assert_eq!(
            ConnectionApproval::ApprovedOnlyThisTime.to_string(),
            "APPROVED_ONLY_THIS_TIME"
        );
        assert!(!ConnectionApproval::RejectedOnlyThisTime.is_approved());
    }

    #[test]
    fn test_trace_ids_are_unique_per_session() {
        assert_ne!(TraceId::generate(), TraceId::generate());
        assert_eq!(TraceId::from("abc").as_str(), "abc");
    }
}
