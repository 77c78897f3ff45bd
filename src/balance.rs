use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::time::timeout;
use tracing::debug;

use crate::chain::ChainProvider;
use crate::error::BalanceError;
use crate::types::{BalanceSnapshot, TokenPair};

/// Maintains the wallet's balances for the active pair. Concurrent
/// refreshes may complete in any order; a snapshot taken against an
/// older block never replaces one taken against a newer block.
pub struct BalanceTracker {
    provider: Arc<dyn ChainProvider>,
    request_timeout: Duration,
    current: RwLock<Option<BalanceSnapshot>>,
}

impl BalanceTracker {
    pub fn new(provider: Arc<dyn ChainProvider>, request_timeout: Duration) -> Self {
        Self {
            provider,
            request_timeout,
            current: RwLock::new(None),
        }
    }

    /// Queries both legs of the pair against the latest chain state and
    /// returns the resulting snapshot. Either both balances update
    /// together or neither does. The returned snapshot is the one this
    /// call produced; the retained one may be newer.
    pub async fn refresh(&self, pair: &TokenPair) -> Result<BalanceSnapshot, BalanceError> {
        let wallet = self
            .provider
            .connected_address()
            .ok_or(BalanceError::NoWallet)?;
        if pair.input.address.is_zero() || pair.output.address.is_zero() {
            return Err(BalanceError::IncompletePair);
        }

        // Height first: balances are read at or after this block, so
        // it is a safe lower bound for ordering snapshots.
        let as_of_block = timeout(self.request_timeout, self.provider.latest_block())
            .await
            .map_err(|_| BalanceError::Timeout)?
            .map_err(BalanceError::Query)?;

        let (input_result, output_result) = tokio::try_join!(
            timeout(
                self.request_timeout,
                self.provider.query_balance(wallet, &pair.input)
            ),
            timeout(
                self.request_timeout,
                self.provider.query_balance(wallet, &pair.output)
            ),
        )
        .map_err(|_| BalanceError::Timeout)?;

        let balance_in = input_result.map_err(BalanceError::Query)?;
        let balance_out = output_result.map_err(BalanceError::Query)?;

        let snapshot = BalanceSnapshot {
            pair: pair.clone(),
            balance_in,
            balance_out,
            as_of_block,
            fetched_at: Utc::now(),
        };

        if !self.store(&snapshot) {
            debug!(
                "Discarding balance snapshot for block {} (newer one already held)",
                snapshot.as_of_block
            );
        }

        Ok(snapshot)
    }

    /// The most recent snapshot by block height, if any refresh has
    /// completed.
    pub fn current(&self) -> Option<BalanceSnapshot> {
        self.current.read().clone()
    }

    fn store(&self, snapshot: &BalanceSnapshot) -> bool {
        let mut current = self.current.write();
        match current.as_ref() {
            Some(existing) if snapshot.as_of_block < existing.as_of_block => false,
            _ => {
                *current = Some(snapshot.clone());
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{test_pair, MockChainProvider};
    use bigdecimal::BigDecimal;
    use ethers::types::Address;
    use std::str::FromStr;

    fn tracker(provider: Arc<MockChainProvider>) -> BalanceTracker {
        BalanceTracker::new(provider, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_refresh_requires_wallet() {
        let provider = Arc::new(MockChainProvider::new());
        let tracker = tracker(provider.clone());

        let result = tracker.refresh(&test_pair()).await;
        assert!(matches!(result, Err(BalanceError::NoWallet)));
        assert_eq!(provider.balance_calls(), 0);
        assert_eq!(provider.latest_calls(), 0);
        assert!(tracker.current().is_none());
    }

    #[tokio::test]
    async fn test_refresh_requires_complete_pair() {
        let provider = Arc::new(MockChainProvider::new());
        provider.set_wallet(Some(Address::repeat_byte(0xAA)));
        let tracker = tracker(provider.clone());

        let mut pair = test_pair();
        pair.output.address = Address::zero();
        let result = tracker.refresh(&pair).await;
        assert!(matches!(result, Err(BalanceError::IncompletePair)));
        assert_eq!(provider.balance_calls(), 0);
        assert_eq!(provider.latest_calls(), 0);
    }

    #[tokio::test]
    async fn test_refresh_stores_snapshot() {
        let pair = test_pair();
        let provider = Arc::new(MockChainProvider::new());
        provider.set_wallet(Some(Address::repeat_byte(0xAA)));
        provider.set_block(42);
        provider.set_balance(pair.input.address, BigDecimal::from_str("1.5").unwrap());
        provider.set_balance(pair.output.address, BigDecimal::from(2000));
        let tracker = tracker(provider.clone());

        let snapshot = tracker.refresh(&pair).await.unwrap();
        assert_eq!(snapshot.as_of_block, 42);
        assert_eq!(snapshot.balance_in, BigDecimal::from_str("1.5").unwrap());
        assert_eq!(snapshot.balance_out, BigDecimal::from(2000));
        assert_eq!(provider.balance_calls(), 2);

        let current = tracker.current().unwrap();
        assert_eq!(current.as_of_block, 42);
        assert_eq!(current.balance_in, snapshot.balance_in);
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_previous_snapshot() {
        let pair = test_pair();
        let provider = Arc::new(MockChainProvider::new());
        provider.set_wallet(Some(Address::repeat_byte(0xAA)));
        provider.set_block(42);
        provider.set_balance(pair.input.address, BigDecimal::from(1));
        provider.set_balance(pair.output.address, BigDecimal::from(100));
        let tracker = tracker(provider.clone());
        tracker.refresh(&pair).await.unwrap();

        provider.set_block(43);
        provider.set_balance(pair.input.address, BigDecimal::from(9));
        provider.fail_balance(pair.output.address, true);

        let result = tracker.refresh(&pair).await;
        assert!(matches!(result, Err(BalanceError::Query(_))));

        // neither leg moved: the block-42 snapshot is still intact
        let current = tracker.current().unwrap();
        assert_eq!(current.as_of_block, 42);
        assert_eq!(current.balance_in, BigDecimal::from(1));
        assert_eq!(current.balance_out, BigDecimal::from(100));
    }

    #[tokio::test]
    async fn test_older_completion_never_replaces_newer() {
        let pair = test_pair();
        let provider = Arc::new(MockChainProvider::new());
        provider.set_wallet(Some(Address::repeat_byte(0xAA)));
        provider.set_block(101);
        provider.set_balance(pair.input.address, BigDecimal::from(7));
        provider.set_balance(pair.output.address, BigDecimal::from(70));
        let tracker = tracker(provider.clone());
        tracker.refresh(&pair).await.unwrap();

        // a refresh that raced and completed against older chain state
        provider.set_block(100);
        provider.set_balance(pair.input.address, BigDecimal::from(1));
        let stale = tracker.refresh(&pair).await.unwrap();
        assert_eq!(stale.as_of_block, 100);

        let current = tracker.current().unwrap();
        assert_eq!(current.as_of_block, 101);
        assert_eq!(current.balance_in, BigDecimal::from(7));
    }

    #[tokio::test]
    async fn test_same_block_refresh_overwrites() {
        let pair = test_pair();
        let provider = Arc::new(MockChainProvider::new());
        provider.set_wallet(Some(Address::repeat_byte(0xAA)));
        provider.set_block(50);
        provider.set_balance(pair.input.address, BigDecimal::from(1));
        provider.set_balance(pair.output.address, BigDecimal::from(2));
        let tracker = tracker(provider.clone());
        tracker.refresh(&pair).await.unwrap();

        provider.set_balance(pair.input.address, BigDecimal::from(3));
        tracker.refresh(&pair).await.unwrap();

        let current = tracker.current().unwrap();
        assert_eq!(current.as_of_block, 50);
        assert_eq!(current.balance_in, BigDecimal::from(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_times_out() {
        let pair = test_pair();
        let provider = Arc::new(MockChainProvider::new());
        provider.set_wallet(Some(Address::repeat_byte(0xAA)));
        provider.set_block(42);
        provider.set_latency(Duration::from_secs(5));
        let tracker = tracker(provider.clone());

        let result = tracker.refresh(&pair).await;
        assert!(matches!(result, Err(BalanceError::Timeout)));
        assert!(tracker.current().is_none());
    }
}
