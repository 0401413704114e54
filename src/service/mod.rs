//! HTTP service exposing the wallet to applications

pub mod auth;
mod handlers;
pub mod policy;
pub mod store;

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::ClientApi;
use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::logging::Logger;
use crate::node::NodeForwarder;
use crate::wallet::WalletStore;
use handlers::AppState;

pub use auth::Auth;
pub use policy::{AutomaticConsentPolicy, ConsentPolicy, ConsentRequest};
pub use store::{FileServiceStore, ServiceStore};

/// A service that can be started in the background and stopped from elsewhere
#[async_trait]
pub trait RunnableService: Send + Sync {
    /// Serve until stopped. An error means the service couldn't start or crashed.
    async fn start(&self) -> Result<()>;

    /// Ask the service to stop. Calling it more than once is harmless.
    async fn stop(&self) -> Result<()>;

    fn url(&self) -> String;
}

pub struct Service {
    log: Logger,
    config: NetworkConfig,
    state: AppState,
    shutdown: CancellationToken,
}

impl Service {
    pub fn new(
        log: Logger,
        config: NetworkConfig,
        api: Arc<ClientApi>,
        auth: Arc<Auth>,
        forwarder: Arc<NodeForwarder>,
        policy: Arc<dyn ConsentPolicy>,
        wallets: Arc<dyn WalletStore>,
    ) -> Self {
        let state = AppState {
            log: log.named("http"),
            api,
            auth,
            forwarder,
            policy,
            wallets,
        };

        Self {
            log,
            config,
            state,
            shutdown: CancellationToken::new(),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/api/v2/health", get(handlers::health))
            .route("/api/v2/requests", post(handlers::handle_v2_request))
            .route(
                "/api/v1/auth/token",
                post(handlers::handle_v1_login).delete(handlers::handle_v1_logout),
            )
            .route("/api/v1/command/sync", post(handlers::handle_v1_command))
            .with_state(self.state.clone())
    }

    async fn serve(&self, listener: TcpListener) -> Result<()> {
        let shutdown = self.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| Error::Server(e.to_string()))?;

        info!(parent: self.log.span(), "HTTP service stopped");
        Ok(())
    }
}

#[async_trait]
impl RunnableService for Service {
    async fn start(&self) -> Result<()> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Server(format!("couldn't listen on {}: {}", addr, e)))?;

        debug!(parent: self.log.span(), addr = %addr, "Listening");
        self.serve(listener).await
    }

    async fn stop(&self) -> Result<()> {
        if !self.shutdown.is_cancelled() {
            info!(parent: self.log.span(), "Stopping HTTP service");
            self.shutdown.cancel();
        }
        Ok(())
    }

    fn url(&self) -> String {
        self.config.service_url()
    }
}
