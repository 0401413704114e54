//! Wallet Dummy Library
//!
//! Headless wallet service for development and testing, where every
//! interaction is approved on behalf of one configured wallet.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod error;
pub mod interactor;
pub mod lifecycle;
pub mod logging;
pub mod network;
pub mod node;
pub mod service;
pub mod wallet;

// Re-export commonly used types
pub use config::NetworkConfig;
pub use error::{Error, Result};
