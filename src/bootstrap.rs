//! Ordered construction of everything the service needs
//!
//! Each stage takes what earlier stages produced and either hands its own
//! product to the next stage or aborts the whole bootstrap. Nothing built by
//! a completed stage is rolled back: stores and handles are simply dropped.
//!
//! ```text
//! passphrase → wallet-store → wallet-unlock → network-store
//!   → network-existence → network-config → network-connectivity
//!   → network-version → service-store → service-initialisation
//!   → auth → node-forwarder → node-selector → api-client → service
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::ClientApi;
use crate::config::{NetworkConfig, NodesConfig};
use crate::error::Error;
use crate::interactor::AlwaysAgreeInteractor;
use crate::logging::Logger;
use crate::network::{is_compatible, FileNetworkStore, HttpVersionProbe, NetworkStore, VersionProbe, CLIENT_VERSION};
use crate::node::{build_round_robin_selector_with_retrying_nodes, NodeForwarder, NodeSelector};
use crate::service::{Auth, AutomaticConsentPolicy, FileServiceStore, Service, ServiceStore};
use crate::wallet::{FileWalletStore, WalletStore};

/// Bootstrap steps that can fail. Building the API client and assembling
/// the service cannot, so they have no stage of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Passphrase,
    WalletStore,
    WalletUnlock,
    NetworkStore,
    NetworkExistence,
    NetworkConfig,
    NetworkConnectivity,
    NetworkVersion,
    ServiceStore,
    ServiceInitialisation,
    Auth,
    NodeForwarder,
    NodeSelector,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Passphrase => "passphrase",
            Stage::WalletStore => "wallet-store",
            Stage::WalletUnlock => "wallet-unlock",
            Stage::NetworkStore => "network-store",
            Stage::NetworkExistence => "network-existence",
            Stage::NetworkConfig => "network-config",
            Stage::NetworkConnectivity => "network-connectivity",
            Stage::NetworkVersion => "network-version",
            Stage::ServiceStore => "service-store",
            Stage::ServiceInitialisation => "service-initialisation",
            Stage::Auth => "auth",
            Stage::NodeForwarder => "node-forwarder",
            Stage::NodeSelector => "node-selector",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("couldn't read the passphrase: {0}")]
    Passphrase(#[source] Error),

    #[error("couldn't initialise wallets store: {0}")]
    WalletStore(#[source] Error),

    #[error("could not retrieve the wallet: {0}")]
    WalletUnlock(#[source] Error),

    #[error("couldn't initialise network store: {0}")]
    NetworkStore(#[source] Error),

    #[error("couldn't verify the network existence: {0}")]
    NetworkExistence(#[source] Error),

    #[error("network \"{0}\" does not exist")]
    NetworkDoesNotExist(String),

    #[error("couldn't retrieve the network configuration: {0}")]
    NetworkConfig(#[source] Error),

    #[error("the network configuration can't be used to reach a node: {0}")]
    InsufficientNetworkConfig(#[source] Error),

    #[error("couldn't retrieve the network version: {0}")]
    NetworkVersion(#[source] Error),

    #[error("couldn't initialise service store: {0}")]
    ServiceStore(#[source] Error),

    #[error("couldn't verify service initialisation state: {0}")]
    ServiceInitialisation(#[source] Error),

    #[error("first, you need to initialise the service, using the `service init` command")]
    NotInitialised,

    #[error("couldn't initialise authentication: {0}")]
    Auth(#[source] Error),

    #[error("couldn't initialise the node forwarder: {0}")]
    NodeForwarder(#[source] Error),

    #[error("couldn't instantiate the node API: {0}")]
    NodeSelector(#[source] Error),
}

impl BootstrapError {
    /// The stage that failed
    pub fn stage(&self) -> Stage {
        match self {
            BootstrapError::Passphrase(_) => Stage::Passphrase,
            BootstrapError::WalletStore(_) => Stage::WalletStore,
            BootstrapError::WalletUnlock(_) => Stage::WalletUnlock,
            BootstrapError::NetworkStore(_) => Stage::NetworkStore,
            BootstrapError::NetworkExistence(_) | BootstrapError::NetworkDoesNotExist(_) => {
                Stage::NetworkExistence
            }
            BootstrapError::NetworkConfig(_) => Stage::NetworkConfig,
            BootstrapError::InsufficientNetworkConfig(_) => Stage::NetworkConnectivity,
            BootstrapError::NetworkVersion(_) => Stage::NetworkVersion,
            BootstrapError::ServiceStore(_) => Stage::ServiceStore,
            BootstrapError::ServiceInitialisation(_) | BootstrapError::NotInitialised => {
                Stage::ServiceInitialisation
            }
            BootstrapError::Auth(_) => Stage::Auth,
            BootstrapError::NodeForwarder(_) => Stage::NodeForwarder,
            BootstrapError::NodeSelector(_) => Stage::NodeSelector,
        }
    }
}

/// Constructors for the external capabilities the bootstrap consumes
#[async_trait]
pub trait Collaborators: Send + Sync {
    fn read_passphrase(&self, path: &Path) -> crate::error::Result<String>;

    fn wallet_store(&self) -> crate::error::Result<Arc<dyn WalletStore>>;

    fn network_store(&self) -> crate::error::Result<Arc<dyn NetworkStore>>;

    async fn network_version(&self, hosts: &[String]) -> crate::error::Result<String>;

    fn service_store(&self) -> crate::error::Result<Arc<dyn ServiceStore>>;

    fn auth(
        &self,
        log: Logger,
        store: &dyn ServiceStore,
        token_expiry: Duration,
    ) -> crate::error::Result<Auth>;

    fn node_forwarder(&self, log: Logger, config: &NodesConfig)
        -> crate::error::Result<NodeForwarder>;

    fn node_selector(
        &self,
        log: Logger,
        hosts: &[String],
        retries: u64,
    ) -> crate::error::Result<Arc<dyn NodeSelector>>;
}

/// Collaborators backed by the files under the home directory
pub struct LocalCollaborators {
    home: PathBuf,
    probe: HttpVersionProbe,
}

impl LocalCollaborators {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            probe: HttpVersionProbe::default(),
        }
    }
}

#[async_trait]
impl Collaborators for LocalCollaborators {
    fn read_passphrase(&self, path: &Path) -> crate::error::Result<String> {
        crate::cli::flags::read_passphrase_file(path)
    }

    fn wallet_store(&self) -> crate::error::Result<Arc<dyn WalletStore>> {
        Ok(Arc::new(FileWalletStore::initialise(&self.home)?))
    }

    fn network_store(&self) -> crate::error::Result<Arc<dyn NetworkStore>> {
        Ok(Arc::new(FileNetworkStore::initialise(&self.home)?))
    }

    async fn network_version(&self, hosts: &[String]) -> crate::error::Result<String> {
        self.probe.network_version(hosts).await
    }

    fn service_store(&self) -> crate::error::Result<Arc<dyn ServiceStore>> {
        Ok(Arc::new(FileServiceStore::initialise(&self.home)?))
    }

    fn auth(
        &self,
        log: Logger,
        store: &dyn ServiceStore,
        token_expiry: Duration,
    ) -> crate::error::Result<Auth> {
        Auth::new(log, store, token_expiry)
    }

    fn node_forwarder(
        &self,
        log: Logger,
        config: &NodesConfig,
    ) -> crate::error::Result<NodeForwarder> {
        NodeForwarder::new(log, config)
    }

    fn node_selector(
        &self,
        log: Logger,
        hosts: &[String],
        retries: u64,
    ) -> crate::error::Result<Arc<dyn NodeSelector>> {
        let selector = build_round_robin_selector_with_retrying_nodes(log, hosts, retries)?;
        Ok(Arc::new(selector))
    }
}

/// What `service run` was asked to start
#[derive(Debug, Clone)]
pub struct BootstrapRequest {
    pub network: String,
    pub wallet: String,
    pub passphrase_file: PathBuf,
}

/// A service ready to be started, with the network it serves
pub struct Assembled {
    pub service: Service,
    pub network: NetworkConfig,
}

type StageResult<T> = std::result::Result<T, BootstrapError>;

pub struct Bootstrap<'a, C: Collaborators + ?Sized> {
    log: Logger,
    collaborators: &'a C,
    request: &'a BootstrapRequest,
}

impl<'a, C: Collaborators + ?Sized> Bootstrap<'a, C> {
    pub fn new(log: Logger, collaborators: &'a C, request: &'a BootstrapRequest) -> Self {
        Self {
            log,
            collaborators,
            request,
        }
    }

    /// Run every stage in order, stopping at the first failure
    pub async fn run(&self) -> StageResult<Assembled> {
        let passphrase = self.resolve_passphrase()?;
        let wallets = self.open_wallet_store()?;
        self.unlock_wallet(wallets.as_ref(), &passphrase).await?;

        let networks = self.open_network_store()?;
        self.ensure_network_exists(networks.as_ref())?;
        let network = self.fetch_network(networks.as_ref())?;
        self.ensure_can_connect_node(&network)?;
        self.check_network_version(&network).await?;

        let service_store = self.open_service_store()?;
        self.ensure_service_initialised(service_store.as_ref())?;

        let auth = self.build_auth(service_store.as_ref(), &network)?;
        let forwarder = self.build_forwarder(&network)?;
        let selector = self.build_selector(&network)?;
        let api = self.build_api_client(wallets.clone(), passphrase, selector);
        let service = self.assemble_service(&network, api, auth, forwarder, wallets);

        Ok(Assembled { service, network })
    }

    fn resolve_passphrase(&self) -> StageResult<String> {
        self.collaborators
            .read_passphrase(&self.request.passphrase_file)
            .map_err(BootstrapError::Passphrase)
    }

    fn open_wallet_store(&self) -> StageResult<Arc<dyn WalletStore>> {
        debug!(parent: self.log.span(), "Initializing the wallet store...");
        let store = self
            .collaborators
            .wallet_store()
            .map_err(BootstrapError::WalletStore)?;
        debug!(parent: self.log.span(), "The wallet store has been initialized");
        Ok(store)
    }

    async fn unlock_wallet(&self, wallets: &dyn WalletStore, passphrase: &str) -> StageResult<()> {
        wallets
            .unlock(&self.request.wallet, passphrase)
            .await
            .map(|_| ())
            .map_err(BootstrapError::WalletUnlock)
    }

    fn open_network_store(&self) -> StageResult<Arc<dyn NetworkStore>> {
        debug!(parent: self.log.span(), "Initializing the network store...");
        let store = self
            .collaborators
            .network_store()
            .map_err(BootstrapError::NetworkStore)?;
        debug!(parent: self.log.span(), "The network store has been initialized");
        Ok(store)
    }

    fn ensure_network_exists(&self, networks: &dyn NetworkStore) -> StageResult<()> {
        let name = &self.request.network;
        debug!(parent: self.log.span(), network = %name, "Verifying the network exist...");
        if !networks
            .network_exists(name)
            .map_err(BootstrapError::NetworkExistence)?
        {
            return Err(BootstrapError::NetworkDoesNotExist(name.clone()));
        }
        debug!(parent: self.log.span(), "The network exists");
        Ok(())
    }

    fn fetch_network(&self, networks: &dyn NetworkStore) -> StageResult<NetworkConfig> {
        debug!(parent: self.log.span(), network = %self.request.network, "Retrieving the network configuration...");
        let network = networks
            .get_network(&self.request.network)
            .map_err(BootstrapError::NetworkConfig)?;
        debug!(parent: self.log.span(), "The network configuration has been retrieved");
        Ok(network)
    }

    fn ensure_can_connect_node(&self, network: &NetworkConfig) -> StageResult<()> {
        debug!(parent: self.log.span(), "Ensuring the network configuration has the minimal configuration to connect to the network...");
        network
            .ensure_can_connect_node()
            .map_err(BootstrapError::InsufficientNetworkConfig)?;
        debug!(parent: self.log.span(), "The network configuration is ok");
        Ok(())
    }

    /// A version mismatch only warns; failing to reach any host aborts
    async fn check_network_version(&self, network: &NetworkConfig) -> StageResult<()> {
        let network_version = self
            .collaborators
            .network_version(&network.api.nodes.hosts)
            .await
            .map_err(BootstrapError::NetworkVersion)?;

        if !is_compatible(&network_version) {
            warn!(
                parent: self.log.span(),
                network_version = %network_version,
                client_version = CLIENT_VERSION,
                "This software is not compatible with this network"
            );
        }
        Ok(())
    }

    fn open_service_store(&self) -> StageResult<Arc<dyn ServiceStore>> {
        debug!(parent: self.log.span(), "Initializing the service store...");
        let store = self
            .collaborators
            .service_store()
            .map_err(BootstrapError::ServiceStore)?;
        debug!(parent: self.log.span(), "The service store has been initialized");
        Ok(store)
    }

    fn ensure_service_initialised(&self, store: &dyn ServiceStore) -> StageResult<()> {
        debug!(parent: self.log.span(), "Verifying the service has been initialized...");
        if !store
            .is_initialised()
            .map_err(BootstrapError::ServiceInitialisation)?
        {
            return Err(BootstrapError::NotInitialised);
        }
        debug!(parent: self.log.span(), "The service is properly initialized");
        Ok(())
    }

    fn build_auth(&self, store: &dyn ServiceStore, network: &NetworkConfig) -> StageResult<Auth> {
        debug!(parent: self.log.span(), "Initializing API v1 authentication system...");
        let auth = self
            .collaborators
            .auth(self.log.named("auth"), store, network.token_expiry())
            .map_err(BootstrapError::Auth)?;
        debug!(parent: self.log.span(), "API v1 authentication system has been initialized");
        Ok(auth)
    }

    fn build_forwarder(&self, network: &NetworkConfig) -> StageResult<NodeForwarder> {
        debug!(parent: self.log.span(), "Initializing API v1 node forwarder...");
        let forwarder = self
            .collaborators
            .node_forwarder(self.log.named("forwarder"), &network.api.nodes)
            .map_err(BootstrapError::NodeForwarder)?;
        debug!(parent: self.log.span(), "API v1 node forwarder has been initialized");
        Ok(forwarder)
    }

    fn build_selector(&self, network: &NetworkConfig) -> StageResult<Arc<dyn NodeSelector>> {
        debug!(parent: self.log.span(), "Initializing API v2 node selector...");
        let nodes = &network.api.nodes;
        let selector = self
            .collaborators
            .node_selector(self.log.named("json-rpc"), &nodes.hosts, nodes.retries)
            .map_err(BootstrapError::NodeSelector)?;
        debug!(parent: self.log.span(), "API v2 node selector is initialized");
        Ok(selector)
    }

    fn build_api_client(
        &self,
        wallets: Arc<dyn WalletStore>,
        passphrase: String,
        selector: Arc<dyn NodeSelector>,
    ) -> ClientApi {
        debug!(parent: self.log.span(), "Initializing API v2 client...");
        let interactor = AlwaysAgreeInteractor::new(
            self.log.named("always-agree-interactor"),
            self.request.wallet.clone(),
            passphrase,
        );
        let api = ClientApi::new(
            self.log.named("json-rpc"),
            wallets,
            Arc::new(interactor),
            selector,
        );
        debug!(parent: self.log.span(), "API v2 client is initialized");
        api
    }

    fn assemble_service(
        &self,
        network: &NetworkConfig,
        api: ClientApi,
        auth: Auth,
        forwarder: NodeForwarder,
        wallets: Arc<dyn WalletStore>,
    ) -> Service {
        debug!(parent: self.log.span(), "Initializing the service...");
        let service = Service::new(
            self.log.named("api"),
            network.clone(),
            Arc::new(api),
            Arc::new(auth),
            Arc::new(forwarder),
            Arc::new(AutomaticConsentPolicy::new(self.log.named("policy"))),
            wallets,
        );
        debug!(parent: self.log.span(), "The service is initialized");
        service
    }
}
