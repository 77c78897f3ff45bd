use bigdecimal::BigDecimal;
use ethers::types::Address;
use thiserror::Error;

/// Configuration problems are fatal at load time.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Failures talking to the chain provider or wallet.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("provider unavailable: {0}")]
    Provider(String),

    #[error("rpc request failed: {0}")]
    Rpc(String),

    #[error("invalid wallet key: {0}")]
    WalletKey(String),

    #[error("configured wallet {expected:?} does not match key-derived address {actual:?}")]
    WalletMismatch { expected: Address, actual: Address },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Why a balance refresh produced no snapshot.
#[derive(Error, Debug)]
pub enum BalanceError {
    #[error("no wallet connected")]
    NoWallet,

    #[error("token pair is not fully configured")]
    IncompletePair,

    #[error("balance query failed: {0}")]
    Query(#[source] ChainError),

    #[error("balance refresh timed out")]
    Timeout,
}

/// Failures while pricing or constructing a trade.
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("trade amount must be positive, got {amount}")]
    InvalidAmount { amount: BigDecimal },

    #[error("no viable quote for the requested swap: {reason}")]
    QuoteUnavailable { reason: String },

    #[error("no signer available for submission")]
    NoSigner,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Failures in the signing and broadcast path.
#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("transaction could not be sent: {0}")]
    Send(String),

    #[error("confirmation check failed: {0}")]
    Confirm(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
