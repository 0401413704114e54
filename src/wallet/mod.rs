//! Wallet credential store
//!
//! The service only needs three things from the wallet store: the list of
//! wallet names, whether a wallet exists, and a way to unlock a wallet with
//! its passphrase. Key management lives outside of this crate.

pub mod store;

pub use store::{FileWalletStore, WalletRecord, WalletStore, WalletSummary};
