use async_trait::async_trait;
use bigdecimal::BigDecimal;
use ethers::types::{Address, TxHash};

use crate::error::{BroadcastError, TradeError};
use crate::types::{BuiltTrade, FeeTier, SwapRoute, TokenPair, TransactionState};

/// Prices a prospective swap against a single pool.
#[async_trait]
pub trait PricingEngine: Send + Sync {
    async fn quote(
        &self,
        amount_in: &BigDecimal,
        pair: &TokenPair,
        fee: FeeTier,
    ) -> Result<SwapRoute, TradeError>;
}

/// Signs, broadcasts and settles built trades.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    fn signer_address(&self) -> Option<Address>;

    /// Signs the swap and hands it to the network. Returns once the
    /// transaction hash exists; an error here means nothing reached
    /// the chain.
    async fn sign_and_send(&self, trade: &BuiltTrade) -> Result<TxHash, BroadcastError>;

    /// Waits for the transaction to settle and reports how it ended.
    async fn confirm(&self, tx_hash: TxHash) -> Result<TransactionState, BroadcastError>;
}
