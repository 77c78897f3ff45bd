use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use ethers::types::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    pub chain_id: u64,
}

impl Token {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8, chain_id: u64) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
            chain_id,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol)
    }
}

/// A directed swap pair: `input` is spent, `output` is received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub input: Token,
    pub output: Token,
}

impl TokenPair {
    pub fn new(input: Token, output: Token) -> Self {
        Self { input, output }
    }

    /// The same pair with the swap direction reversed.
    pub fn flipped(&self) -> Self {
        Self {
            input: self.output.clone(),
            output: self.input.clone(),
        }
    }
}

impl fmt::Display for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.input.symbol, self.output.symbol)
    }
}

/// Uniswap V3 pool fee tiers, in hundredths of a basis point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeTier {
    Low,
    Medium,
    High,
}

impl FeeTier {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            500 => Some(FeeTier::Low),
            3000 => Some(FeeTier::Medium),
            10000 => Some(FeeTier::High),
            _ => None,
        }
    }

    pub fn as_u32(self) -> u32 {
        match self {
            FeeTier::Low => 500,
            FeeTier::Medium => 3000,
            FeeTier::High => 10000,
        }
    }
}

/// How the input amount for each trade cycle is chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum AmountMode {
    /// Every cycle trades exactly this amount of the input token.
    Fixed(BigDecimal),
    /// Every cycle trades a random fraction of the current input-token
    /// balance. The fraction blends two independent uniform draws:
    /// `w * u1 + (1 - w) * u2`.
    Randomized { blend_weight: f64 },
}

/// Lifecycle of a single submitted swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionState {
    New,
    Sending,
    Sent,
    Confirmed,
    Rejected,
    Failed,
}

impl TransactionState {
    /// Terminal states are never left once entered. `Sent` is not
    /// terminal in principle but is never re-polled by the bot.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionState::Confirmed | TransactionState::Rejected | TransactionState::Failed
        )
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionState::New => "new",
            TransactionState::Sending => "sending",
            TransactionState::Sent => "sent",
            TransactionState::Confirmed => "confirmed",
            TransactionState::Rejected => "rejected",
            TransactionState::Failed => "failed",
        };
        write!(f, "{}", label)
    }
}

/// Wallet balances for both legs of a pair, read against a single
/// observed chain height. `as_of_block` is the height read immediately
/// before the balance queries, so it is a lower bound on the state the
/// balances reflect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub pair: TokenPair,
    pub balance_in: BigDecimal,
    pub balance_out: BigDecimal,
    pub as_of_block: u64,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    pub id: Uuid,
    pub pair: TokenPair,
    pub amount_in: BigDecimal,
    pub created_at: DateTime<Utc>,
}

impl TradeIntent {
    pub fn new(amount_in: BigDecimal, pair: TokenPair) -> Self {
        Self {
            id: Uuid::new_v4(),
            pair,
            amount_in,
            created_at: Utc::now(),
        }
    }
}

/// A priced route returned by the quoting engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapRoute {
    pub fee: FeeTier,
    pub amount_in_raw: U256,
    pub quoted_amount_out_raw: U256,
    pub quoted_amount_out: BigDecimal,
}

/// A fully priced trade, ready for signing and broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltTrade {
    pub intent: TradeIntent,
    pub route: SwapRoute,
    pub min_amount_out_raw: U256,
    pub min_amount_out: BigDecimal,
}

impl fmt::Display for BuiltTrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} (quoted {}, min {})",
            self.intent.amount_in,
            self.intent.pair.input.symbol,
            self.intent.pair.output.symbol,
            self.route.quoted_amount_out,
            self.min_amount_out,
        )
    }
}

/// What became of one submitted trade.
#[derive(Debug, Clone)]
pub struct TradeOutcome {
    pub state: TransactionState,
    pub tx_hash: Option<TxHash>,
    pub detail: Option<String>,
}

impl TradeOutcome {
    pub fn rejected(detail: impl Into<String>) -> Self {
        Self {
            state: TransactionState::Rejected,
            tx_hash: None,
            detail: Some(detail.into()),
        }
    }

    pub fn in_flight(tx_hash: TxHash, detail: impl Into<String>) -> Self {
        Self {
            state: TransactionState::Sent,
            tx_hash: Some(tx_hash),
            detail: Some(detail.into()),
        }
    }

    pub fn settled(state: TransactionState, tx_hash: TxHash) -> Self {
        Self {
            state,
            tx_hash: Some(tx_hash),
            detail: None,
        }
    }
}

/// Converts a human-readable token amount into raw base units.
/// Fractional digits beyond the token's precision are truncated.
pub fn to_base_units(amount: &BigDecimal, decimals: u8) -> Result<U256> {
    if *amount < BigDecimal::from(0) {
        return Err(anyhow!("token amount cannot be negative: {}", amount));
    }
    let scaled = (amount * BigDecimal::from(10_u64.pow(decimals as u32))).with_scale(0);
    U256::from_dec_str(&scaled.to_string())
        .map_err(|e| anyhow!("amount {} does not fit into uint256: {}", amount, e))
}

/// Converts raw base units into a human-readable token amount.
pub fn from_base_units(raw: U256, decimals: u8) -> Result<BigDecimal> {
    let digits = BigDecimal::from_str(&raw.to_string())
        .map_err(|e| anyhow!("invalid base unit amount {}: {}", raw, e))?;
    Ok(digits / BigDecimal::from(10_u64.pow(decimals as u32)))
}
