//! Shared mocks and fixtures for unit tests.

use std::collections::{HashMap, HashSet};
use std::future::pending;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use ethers::types::{Address, TxHash, U256};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::chain::{BlockSubscription, ChainProvider};
use crate::dex::{Broadcaster, PricingEngine};
use crate::error::{BroadcastError, ChainError, TradeError};
use crate::types::{
    from_base_units, to_base_units, BuiltTrade, FeeTier, SwapRoute, Token, TokenPair, TradeIntent,
    TransactionState,
};

/// Polls `predicate` until it holds. Virtual time advances during the
/// sleeps, so paused-clock tests resolve immediately.
pub async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

/// The Goerli WETH/USDC pair used throughout the tests.
pub fn test_pair() -> TokenPair {
    TokenPair::new(
        Token::new(
            "0xB4FBF271143F4FBf7B91A5ded31805e42b2208d6"
                .parse()
                .unwrap(),
            "WETH",
            18,
            5,
        ),
        Token::new(
            "0x07865c6E87B9F70255377e024ace6630C1Eaa37F"
                .parse()
                .unwrap(),
            "USDC",
            6,
            5,
        ),
    )
}

/// A priced 0.001 WETH -> USDC trade with 50 bps of slippage applied.
pub fn test_trade() -> BuiltTrade {
    let pair = test_pair();
    let amount_in = BigDecimal::from_str("0.001").unwrap();
    let route = SwapRoute {
        fee: FeeTier::Medium,
        amount_in_raw: to_base_units(&amount_in, pair.input.decimals).unwrap(),
        quoted_amount_out_raw: U256::from(1_000_000_u64),
        quoted_amount_out: BigDecimal::from(1),
    };
    BuiltTrade {
        intent: TradeIntent::new(amount_in, pair),
        route,
        min_amount_out_raw: U256::from(995_000_u64),
        min_amount_out: BigDecimal::from_str("0.995").unwrap(),
    }
}

/// Scriptable chain provider. Blocks pushed into `feed()` flow through
/// the subscription returned by `subscribe_new_blocks`.
pub struct MockChainProvider {
    feed_tx: mpsc::Sender<u64>,
    feed_rx: Mutex<Option<mpsc::Receiver<u64>>>,
    wallet: Mutex<Option<Address>>,
    block: AtomicU64,
    balances: Mutex<HashMap<Address, BigDecimal>>,
    failing: Mutex<HashSet<Address>>,
    latency: Mutex<Duration>,
    balance_calls: AtomicUsize,
    latest_calls: AtomicUsize,
}

impl MockChainProvider {
    pub fn new() -> Self {
        let (feed_tx, feed_rx) = mpsc::channel(64);
        Self {
            feed_tx,
            feed_rx: Mutex::new(Some(feed_rx)),
            wallet: Mutex::new(None),
            block: AtomicU64::new(0),
            balances: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            latency: Mutex::new(Duration::ZERO),
            balance_calls: AtomicUsize::new(0),
            latest_calls: AtomicUsize::new(0),
        }
    }

    /// Sender that drives the block subscription. Its send fails once
    /// the subscription has shut down.
    pub fn feed(&self) -> mpsc::Sender<u64> {
        self.feed_tx.clone()
    }

    pub fn set_wallet(&self, wallet: Option<Address>) {
        *self.wallet.lock() = wallet;
    }

    pub fn set_block(&self, number: u64) {
        self.block.store(number, Ordering::SeqCst);
    }

    pub fn set_balance(&self, token: Address, balance: BigDecimal) {
        self.balances.lock().insert(token, balance);
    }

    pub fn fail_balance(&self, token: Address, failing: bool) {
        if failing {
            self.failing.lock().insert(token);
        } else {
            self.failing.lock().remove(&token);
        }
    }

    /// Delay applied to every chain call, for timeout tests.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    pub fn balance_calls(&self) -> usize {
        self.balance_calls.load(Ordering::SeqCst)
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

impl Default for MockChainProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChainProvider for MockChainProvider {
    async fn subscribe_new_blocks(&self) -> Result<BlockSubscription, ChainError> {
        let mut feed = self
            .feed_rx
            .lock()
            .take()
            .ok_or_else(|| ChainError::Provider("subscription already taken".to_string()))?;
        let (block_tx, block_rx) = mpsc::channel(64);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    number = feed.recv() => match number {
                        Some(number) => {
                            if block_tx.send(number).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(BlockSubscription {
            blocks: block_rx,
            shutdown: shutdown_tx,
        })
    }

    async fn latest_block(&self) -> Result<u64, ChainError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        Ok(self.block.load(Ordering::SeqCst))
    }

    async fn query_balance(&self, _owner: Address, token: &Token) -> Result<BigDecimal, ChainError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        if self.failing.lock().contains(&token.address) {
            return Err(ChainError::Rpc(format!(
                "balanceOf reverted for {}",
                token.symbol
            )));
        }
        self.balances
            .lock()
            .get(&token.address)
            .cloned()
            .ok_or_else(|| ChainError::Rpc(format!("no balance configured for {}", token.symbol)))
    }

    fn connected_address(&self) -> Option<Address> {
        *self.wallet.lock()
    }

    async fn is_available(&self) -> bool {
        true
    }
}

/// Pricing engine that records its calls and answers with a canned
/// quote.
pub struct MockPricingEngine {
    quote_out_raw: Mutex<U256>,
    fail: AtomicBool,
    calls: Mutex<Vec<(BigDecimal, TokenPair)>>,
}

impl MockPricingEngine {
    pub fn new() -> Self {
        Self {
            quote_out_raw: Mutex::new(U256::from(1_000_000_u64)),
            fail: AtomicBool::new(false),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_quote_out_raw(&self, raw: U256) {
        *self.quote_out_raw.lock() = raw;
    }

    pub fn fail_next_quotes(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(BigDecimal, TokenPair)> {
        self.calls.lock().clone()
    }
}

impl Default for MockPricingEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PricingEngine for MockPricingEngine {
    async fn quote(
        &self,
        amount_in: &BigDecimal,
        pair: &TokenPair,
        fee: FeeTier,
    ) -> Result<SwapRoute, TradeError> {
        self.calls.lock().push((amount_in.clone(), pair.clone()));
        if self.fail.load(Ordering::SeqCst) {
            return Err(TradeError::QuoteUnavailable {
                reason: "pool has no liquidity".to_string(),
            });
        }
        let raw = *self.quote_out_raw.lock();
        Ok(SwapRoute {
            fee,
            amount_in_raw: to_base_units(amount_in, pair.input.decimals)?,
            quoted_amount_out_raw: raw,
            quoted_amount_out: from_base_units(raw, pair.output.decimals)?,
        })
    }
}

/// Broadcaster whose outcome per phase is scripted by the test.
pub struct MockBroadcaster {
    signer: Mutex<Option<Address>>,
    reject: Mutex<Option<String>>,
    settle: Mutex<TransactionState>,
    hang_send: AtomicBool,
    hang_confirm: AtomicBool,
    fail_confirm: Mutex<Option<String>>,
    sent: Mutex<Vec<String>>,
}

impl MockBroadcaster {
    pub fn new() -> Self {
        Self {
            signer: Mutex::new(Some(Address::repeat_byte(0x11))),
            reject: Mutex::new(None),
            settle: Mutex::new(TransactionState::Confirmed),
            hang_send: AtomicBool::new(false),
            hang_confirm: AtomicBool::new(false),
            fail_confirm: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn set_signer(&self, signer: Option<Address>) {
        *self.signer.lock() = signer;
    }

    pub fn reject_sends(&self, message: &str) {
        *self.reject.lock() = Some(message.to_string());
    }

    pub fn settle_as(&self, state: TransactionState) {
        *self.settle.lock() = state;
    }

    pub fn hang_sends(&self) {
        self.hang_send.store(true, Ordering::SeqCst);
    }

    pub fn hang_confirmations(&self) {
        self.hang_confirm.store(true, Ordering::SeqCst);
    }

    pub fn fail_confirmations(&self, message: &str) {
        *self.fail_confirm.lock() = Some(message.to_string());
    }

    /// Summaries of every trade that reached the network.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

impl Default for MockBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broadcaster for MockBroadcaster {
    fn signer_address(&self) -> Option<Address> {
        *self.signer.lock()
    }

    async fn sign_and_send(&self, trade: &BuiltTrade) -> Result<TxHash, BroadcastError> {
        if self.hang_send.load(Ordering::SeqCst) {
            pending::<()>().await;
        }
        if let Some(message) = self.reject.lock().clone() {
            return Err(BroadcastError::Send(message));
        }
        self.sent.lock().push(trade.to_string());
        Ok(TxHash::repeat_byte(0x42))
    }

    async fn confirm(&self, _tx_hash: TxHash) -> Result<TransactionState, BroadcastError> {
        if self.hang_confirm.load(Ordering::SeqCst) {
            pending::<()>().await;
        }
        if let Some(message) = self.fail_confirm.lock().clone() {
            return Err(BroadcastError::Confirm(message));
        }
        Ok(*self.settle.lock())
    }
}
