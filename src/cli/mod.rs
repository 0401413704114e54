pub mod commands;
pub mod flags;

pub use flags::{read_passphrase_file, RunServiceFlags};
