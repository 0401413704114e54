//! Wallet Dummy - a wallet service that approves everything
//!
//! # WARNING
//! - This software is insecure by design to ease development and testing.
//! - Every connection, permission and transaction is approved on behalf of
//!   the configured wallet.
//! - USE FOR DEVELOPMENT AND TESTING ONLY.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

use wallet_dummy::cli::{commands, RunServiceFlags};
use wallet_dummy::logging::{self, LogFormat};

/// Wallet service approving every request, for development and testing
#[derive(Parser)]
#[command(name = "wallet-dummy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the wallets, networks and service state
    #[arg(long, global = true, env = "WALLET_DUMMY_HOME", default_value = "./.wallet-dummy")]
    home: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the wallet service
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },

    /// Manage the wallets
    Wallet {
        #[command(subcommand)]
        action: WalletAction,
    },

    /// Inspect the network configurations
    Network {
        #[command(subcommand)]
        action: NetworkAction,
    },
}

#[derive(Subcommand)]
enum ServiceAction {
    /// Start the wallet service. Hit ctrl+c to terminate it.
    Run(RunServiceFlags),

    /// Initialise the service, required once before running it
    Init {
        /// Overwrite the existing initialisation
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum WalletAction {
    /// Create a wallet protected by a passphrase
    Create {
        /// Wallet name
        #[arg(short, long)]
        wallet: String,

        /// File holding the wallet's passphrase
        #[arg(short, long)]
        passphrase_file: PathBuf,
    },

    /// List the wallets
    List,
}

#[derive(Subcommand)]
enum NetworkAction {
    /// Show a network configuration (secrets masked)
    Show {
        /// Network name
        #[arg(short, long)]
        network: String,
    },

    /// List the configured networks
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let (level, format) = match &cli.command {
        Commands::Service {
            action: ServiceAction::Run(flags),
        } => (flags.log_level.as_str(), flags.log_format.as_str()),
        _ => ("info", "console"),
    };
    if let Err(e) = format
        .parse::<LogFormat>()
        .and_then(|format| logging::init(level, format))
    {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let home = cli.home.as_path();
    let result = match &cli.command {
        Commands::Service { action } => match action {
            ServiceAction::Run(flags) => commands::service_run(home, flags).await,
            ServiceAction::Init { force } => commands::service_init(home, *force),
        },
        Commands::Wallet { action } => match action {
            WalletAction::Create {
                wallet,
                passphrase_file,
            } => commands::wallet_create(home, wallet, passphrase_file),
            WalletAction::List => commands::wallet_list(home).await,
        },
        Commands::Network { action } => match action {
            NetworkAction::Show { network } => commands::network_show(home, network),
            NetworkAction::List => commands::network_list(home),
        },
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    Ok(())
}
