pub mod balance;
pub mod bot;
pub mod chain;
pub mod config;
pub mod dex;
pub mod error;
pub mod trade;
pub mod types;
pub mod watcher;

#[cfg(test)]
mod testutil;

pub use config::Config;
pub use types::*;
