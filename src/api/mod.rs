//! Client API driving the interaction protocol
//!
//! Every call made on behalf of a connected application runs inside an
//! interaction session: a fresh [`TraceId`] is generated, the interactor is
//! told the session began, asked for the decisions the call needs, and told
//! the session ended. Failures are reported through
//! [`Interactor::notify_error`] before being returned.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::Error;
use crate::interactor::{ConsentError, ErrorType, Interactor, LogType, Permissions, TraceId};
use crate::logging::Logger;
use crate::node::NodeSelector;
use crate::wallet::WalletStore;

/// Errors returned to the connected application
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Consent(#[from] ConsentError),

    #[error("the user rejected the request")]
    Rejected,

    #[error("no wallet connection matches this token")]
    UnknownConnection,

    #[error("invalid params: {0}")]
    InvalidParams(String),

    #[error(transparent)]
    Wallet(#[from] Error),
}

impl ApiError {
    /// Category reported to the interactor
    pub fn error_type(&self) -> ErrorType {
        match self {
            ApiError::Consent(_) | ApiError::Rejected => ErrorType::User,
            ApiError::UnknownConnection | ApiError::InvalidParams(_) => ErrorType::Application,
            ApiError::Wallet(
                Error::Node { .. } | Error::NoHealthyNode | Error::TransactionRejected { .. },
            ) => ErrorType::Network,
            ApiError::Wallet(_) => ErrorType::Internal,
        }
    }
}

/// A wallet connected to an application
#[derive(Debug, Clone)]
pub struct Connection {
    pub hostname: String,
    pub wallet: String,
    pub permissions: Permissions,
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectedWallet {
    pub token: String,
    pub wallet: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransaction {
    pub public_key: String,
    /// SHA-256 of the payload, hex encoded
    pub digest: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SentTransaction {
    pub tx_hash: String,
    pub received_at: DateTime<Utc>,
    pub sent_at: DateTime<Utc>,
}

/// Hex encoded SHA-256 of a transaction payload
pub fn payload_digest(payload: &[u8]) -> String {
    format!("{:x}", Sha256::digest(payload))
}

pub struct ClientApi {
    log: Logger,
    wallets: Arc<dyn WalletStore>,
    interactor: Arc<dyn Interactor>,
    selector: Arc<dyn NodeSelector>,
    /// Connections by session token. They do not expire and are held until
    /// `disconnect_wallet`, for the lifetime of the process at most.
    connections: DashMap<String, Connection>,
}

impl ClientApi {
    pub fn new(
        log: Logger,
        wallets: Arc<dyn WalletStore>,
        interactor: Arc<dyn Interactor>,
        selector: Arc<dyn NodeSelector>,
    ) -> Self {
        Self {
            log,
            wallets,
            interactor,
            selector,
            connections: DashMap::new(),
        }
    }

    /// Connect `hostname` to the wallet the interactor selects
    pub async fn connect_wallet(&self, hostname: &str) -> Result<ConnectedWallet, ApiError> {
        self.in_session("client.connect_wallet", |trace_id| async move {
            let approval = self
                .interactor
                .request_wallet_connection_review(&trace_id, hostname)
                .await?;
            if !approval.is_approved() {
                return Err(ApiError::Rejected);
            }

            let available = self.wallets.list_wallets().await?;
            let selected = self
                .interactor
                .request_wallet_selection(&trace_id, hostname, &available)
                .await?;
            if let Err(e) = self.wallets.unlock(&selected.wallet, &selected.passphrase).await {
                self.interactor
                    .log(&trace_id, LogType::Error, &format!("couldn't unlock the wallet: {}", e))
                    .await;
                return Err(e.into());
            }

            let token = uuid::Uuid::new_v4().to_string();
            self.connections.insert(
                token.clone(),
                Connection {
                    hostname: hostname.to_string(),
                    wallet: selected.wallet.clone(),
                    permissions: Permissions::new(),
                    connected_at: Utc::now(),
                },
            );

            info!(parent: self.log.span(), trace_id = %trace_id, hostname, wallet = %selected.wallet, "Wallet connected");
            self.interactor
                .notify_successful_request(&trace_id, "The wallet has been connected.")
                .await;

            Ok(ConnectedWallet {
                token,
                wallet: selected.wallet,
            })
        })
        .await
    }

    pub fn disconnect_wallet(&self, token: &str) -> Result<(), ApiError> {
        let (_, connection) = self
            .connections
            .remove(token)
            .ok_or(ApiError::UnknownConnection)?;
        info!(parent: self.log.span(), hostname = %connection.hostname, wallet = %connection.wallet, "Wallet disconnected");
        Ok(())
    }

    pub fn connection(&self, token: &str) -> Result<Connection, ApiError> {
        self.connections
            .get(token)
            .map(|c| c.value().clone())
            .ok_or(ApiError::UnknownConnection)
    }

    /// Ask for `permissions` on the connected wallet; approved ones are recorded
    pub async fn request_permissions(
        &self,
        token: &str,
        permissions: Permissions,
    ) -> Result<Permissions, ApiError> {
        let connection = self.connection(token)?;

        self.in_session("client.request_permissions", |trace_id| async move {
            let approved = self
                .interactor
                .request_permissions_review(
                    &trace_id,
                    &connection.hostname,
                    &connection.wallet,
                    &permissions,
                )
                .await?;
            if !approved {
                return Err(ApiError::Rejected);
            }

            let granted = match self.connections.get_mut(token) {
                Some(mut entry) => {
                    entry.permissions.extend(permissions);
                    entry.permissions.clone()
                }
                None => return Err(ApiError::UnknownConnection),
            };

            self.interactor
                .notify_successful_request(&trace_id, "The permissions have been updated.")
                .await;
            Ok(granted)
        })
        .await
    }

    pub async fn sign_transaction(
        &self,
        token: &str,
        public_key: &str,
        transaction: &str,
    ) -> Result<SignedTransaction, ApiError> {
        let connection = self.connection(token)?;
        validate_transaction_params(public_key, transaction)?;
        let received_at = Utc::now();

        self.in_session("client.sign_transaction", |trace_id| async move {
            self.unlock_connected_wallet(&trace_id, &connection).await?;

            let approved = self
                .interactor
                .request_transaction_review_for_signing(
                    &trace_id,
                    &connection.hostname,
                    &connection.wallet,
                    public_key,
                    transaction,
                    received_at,
                )
                .await?;
            if !approved {
                return Err(ApiError::Rejected);
            }

            let digest = payload_digest(transaction.as_bytes());
            self.interactor
                .notify_successful_request(&trace_id, "The transaction has been signed.")
                .await;

            Ok(SignedTransaction {
                public_key: public_key.to_string(),
                digest,
                received_at,
            })
        })
        .await
    }

    pub async fn send_transaction(
        &self,
        token: &str,
        public_key: &str,
        transaction: &str,
    ) -> Result<SentTransaction, ApiError> {
        let connection = self.connection(token)?;
        validate_transaction_params(public_key, transaction)?;
        let received_at = Utc::now();

        self.in_session("client.send_transaction", |trace_id| async move {
            self.unlock_connected_wallet(&trace_id, &connection).await?;

            let digest = payload_digest(transaction.as_bytes());
            let approved = self
                .interactor
                .request_transaction_review_for_sending(
                    &trace_id,
                    &connection.hostname,
                    &connection.wallet,
                    public_key,
                    &digest,
                    received_at,
                )
                .await?;
            if !approved {
                return Err(ApiError::Rejected);
            }

            let node = self.selector.node().await?;
            let sent_at = Utc::now();
            match node.send_transaction(transaction.as_bytes()).await {
                Ok(tx_hash) => {
                    self.interactor
                        .notify_successful_transaction(&trace_id, &tx_hash, sent_at)
                        .await;
                    Ok(SentTransaction {
                        tx_hash,
                        received_at,
                        sent_at,
                    })
                }
                Err(e) => {
                    self.interactor
                        .notify_failed_transaction(&trace_id, &e.to_string(), sent_at)
                        .await;
                    Err(e.into())
                }
            }
        })
        .await
    }

    pub async fn get_chain_id(&self) -> Result<String, ApiError> {
        let node = self.selector.node().await?;
        let statistics = node.statistics().await?;
        Ok(statistics.chain_id)
    }

    async fn unlock_connected_wallet(
        &self,
        trace_id: &TraceId,
        connection: &Connection,
    ) -> Result<(), ApiError> {
        let passphrase = self
            .interactor
            .request_passphrase(trace_id, &connection.wallet)
            .await?;

        if let Err(e) = self.wallets.unlock(&connection.wallet, &passphrase).await {
            self.interactor
                .log(trace_id, LogType::Error, &format!("couldn't unlock the wallet: {}", e))
                .await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn in_session<T, F, Fut>(&self, method: &str, call: F) -> Result<T, ApiError>
    where
        F: FnOnce(TraceId) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let trace_id = TraceId::generate();
        debug!(parent: self.log.span(), trace_id = %trace_id, method, "Interaction session began");

        self.interactor
            .notify_interaction_session_began(&trace_id)
            .await?;

        let outcome = call(trace_id.clone()).await;
        if let Err(e) = &outcome {
            self.interactor
                .notify_error(&trace_id, e.error_type(), &e.to_string())
                .await;
        }

        self.interactor
            .notify_interaction_session_ended(&trace_id)
            .await;
        debug!(parent: self.log.span(), trace_id = %trace_id, method, "Interaction session ended");

        outcome
    }
}

fn validate_transaction_params(public_key: &str, transaction: &str) -> Result<(), ApiError> {
    if public_key.is_empty() {
        return Err(ApiError::InvalidParams("the public key is required".into()));
    }
    if transaction.is_empty() {
        return Err(ApiError::InvalidParams("the transaction is required".into()));
    }
    Ok(())
}
