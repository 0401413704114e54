//! CLI command implementations

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tracing::{info, warn};

use super::flags::{read_passphrase_file, RunServiceFlags};
use crate::bootstrap::{Bootstrap, LocalCollaborators};
use crate::lifecycle::{self, ShutdownTrigger};
use crate::logging::Logger;
use crate::network::{FileNetworkStore, NetworkStore};
use crate::service::{FileServiceStore, RunnableService};
use crate::wallet::{FileWalletStore, WalletStore};

/// Start the wallet service and block until it is stopped
pub async fn service_run(home: &Path, flags: &RunServiceFlags) -> Result<()> {
    flags.validate()?;

    let log = Logger::root("service");
    let collaborators = LocalCollaborators::new(home);
    let request = flags.bootstrap_request();

    let assembled = Bootstrap::new(log.clone(), &collaborators, &request)
        .run()
        .await?;

    warn!("This software is insecure by design, every request is approved. USE FOR DEVELOPMENT AND TESTING ONLY.");
    info!(
        network = %assembled.network.name,
        wallet = %request.wallet,
        "To terminate the service, hit ctrl+c"
    );

    let service: Arc<dyn RunnableService> = Arc::new(assembled.service);
    let shutdown = lifecycle::run(service, log, lifecycle::wait_for_termination()).await;

    if shutdown.trigger == ShutdownTrigger::ServiceExited {
        warn!("The service stopped on its own");
    }
    Ok(())
}

/// Generate the secret `service run` needs
pub fn service_init(home: &Path, force: bool) -> Result<()> {
    let store = FileServiceStore::initialise(home)?;
    store.generate_token_secret(force)?;
    println!("The service has been initialised under {}", home.display());
    Ok(())
}

pub fn wallet_create(home: &Path, wallet: &str, passphrase_file: &Path) -> Result<()> {
    let passphrase = read_passphrase_file(passphrase_file)?;
    let store = FileWalletStore::initialise(home)?;
    let summary = store.create_wallet(wallet, &passphrase)?;
    println!("Wallet {} created at {}", summary.name, summary.created_at.to_rfc3339());
    Ok(())
}

pub async fn wallet_list(home: &Path) -> Result<()> {
    let store = FileWalletStore::initialise(home)?;
    let wallets = store.list_wallets().await?;

    if wallets.is_empty() {
        println!("No wallet registered");
        return Ok(());
    }
    for wallet in wallets {
        println!("{}", wallet);
    }
    Ok(())
}

/// Print a network configuration, secrets masked
pub fn network_show(home: &Path, network: &str) -> Result<()> {
    if network.is_empty() {
        return Err(anyhow!("network must be specified"));
    }

    let store = FileNetworkStore::initialise(home)?;
    let config = store.get_network(network)?;
    println!("{}", config.masked_display());
    Ok(())
}

pub fn network_list(home: &Path) -> Result<()> {
    let store = FileNetworkStore::initialise(home)?;
    let networks = store.list_networks()?;

    if networks.is_empty() {
        println!("No network configured under {}", home.join("networks").display());
        return Ok(());
    }
    for network in networks {
        println!("{}", network);
    }
    Ok(())
}
