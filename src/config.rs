use std::str::FromStr;
use std::time::Duration;

use bigdecimal::BigDecimal;
use ethers::signers::LocalWallet;
use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{AmountMode, FeeTier, Token, TokenPair};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub chain: ChainConfig,
    pub wallet: WalletConfig,
    pub tokens: TokensConfig,
    pub trading: TradingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub block_poll_interval_ms: u64,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WalletConfig {
    pub address: String,
    pub private_key: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TokenEntry {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TokensConfig {
    pub input: TokenEntry,
    pub output: TokenEntry,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TradingConfig {
    pub pool_fee_tier: u32,
    pub amount_mode: String,
    pub fixed_amount: String,
    pub blend_weight: f64,
    pub min_interval_seconds: u64,
    pub max_interval_seconds: u64,
    pub randomize_direction: bool,
    pub slippage_bps: u32,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut settings = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::Environment::with_prefix("SWAP_BOT"));

        // Override sensitive values from environment if present
        if let Ok(rpc_url) = std::env::var("RPC_URL") {
            settings = settings.set_override("chain.rpc_url", rpc_url)?;
        }
        if let Ok(address) = std::env::var("WALLET_ADDRESS") {
            settings = settings.set_override("wallet.address", address)?;
        }
        if let Ok(private_key) = std::env::var("WALLET_PRIVATE_KEY") {
            settings = settings.set_override("wallet.private_key", private_key)?;
        }

        let config: Config = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations that cannot possibly run. Performs no
    /// network access.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chain.rpc_url.trim().is_empty() {
            return Err(invalid("chain.rpc_url", "rpc url is not set"));
        }
        if self.chain.block_poll_interval_ms == 0 {
            return Err(invalid(
                "chain.block_poll_interval_ms",
                "poll interval must be positive",
            ));
        }
        if self.chain.request_timeout_seconds == 0 {
            return Err(invalid(
                "chain.request_timeout_seconds",
                "request timeout must be positive",
            ));
        }

        parse_address(&self.wallet.address, "wallet.address")?;
        if self.wallet.private_key.trim().is_empty() {
            return Err(invalid("wallet.private_key", "private key is not set"));
        }
        if self.wallet.private_key.parse::<LocalWallet>().is_err() {
            return Err(invalid(
                "wallet.private_key",
                "not a valid secp256k1 private key".to_string(),
            ));
        }

        let input = self.tokens.input.validate("tokens.input")?;
        let output = self.tokens.output.validate("tokens.output")?;
        if input == output {
            return Err(invalid(
                "tokens",
                "input and output tokens must differ",
            ));
        }

        self.trading.fee_tier()?;
        self.trading.amount_mode()?;
        if self.trading.min_interval_seconds == 0 {
            return Err(invalid(
                "trading.min_interval_seconds",
                "interval must be at least one second",
            ));
        }
        if self.trading.max_interval_seconds < self.trading.min_interval_seconds {
            return Err(invalid(
                "trading.max_interval_seconds",
                format!(
                    "max interval {} is below min interval {}",
                    self.trading.max_interval_seconds, self.trading.min_interval_seconds
                ),
            ));
        }
        if self.trading.slippage_bps >= 10_000 {
            return Err(invalid(
                "trading.slippage_bps",
                "slippage must be below 10000 basis points",
            ));
        }

        Ok(())
    }
}

impl ChainConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.block_poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl WalletConfig {
    pub fn address(&self) -> Result<Address, ConfigError> {
        parse_address(&self.address, "wallet.address")
    }
}

impl TokenEntry {
    fn validate(&self, field: &'static str) -> Result<Address, ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(invalid(field, "token symbol is not set"));
        }
        if self.decimals > 18 {
            return Err(invalid(
                field,
                format!("token decimals {} exceed 18", self.decimals),
            ));
        }
        parse_address(&self.address, field)
    }

    fn to_token(&self, field: &'static str, chain_id: u64) -> Result<Token, ConfigError> {
        let address = self.validate(field)?;
        Ok(Token::new(address, self.symbol.clone(), self.decimals, chain_id))
    }
}

impl TokensConfig {
    /// The configured pair in its initial direction: input is spent,
    /// output is received.
    pub fn initial_pair(&self, chain_id: u64) -> Result<TokenPair, ConfigError> {
        let input = self.input.to_token("tokens.input", chain_id)?;
        let output = self.output.to_token("tokens.output", chain_id)?;
        Ok(TokenPair::new(input, output))
    }
}

impl TradingConfig {
    pub fn fee_tier(&self) -> Result<FeeTier, ConfigError> {
        FeeTier::from_u32(self.pool_fee_tier).ok_or_else(|| {
            invalid(
                "trading.pool_fee_tier",
                format!(
                    "{} is not a supported fee tier (500, 3000 or 10000)",
                    self.pool_fee_tier
                ),
            )
        })
    }

    pub fn amount_mode(&self) -> Result<AmountMode, ConfigError> {
        match self.amount_mode.as_str() {
            "fixed" => {
                let amount = BigDecimal::from_str(&self.fixed_amount).map_err(|e| {
                    invalid(
                        "trading.fixed_amount",
                        format!("'{}' is not a decimal amount: {}", self.fixed_amount, e),
                    )
                })?;
                if amount <= BigDecimal::from(0) {
                    return Err(invalid(
                        "trading.fixed_amount",
                        format!("fixed amount {} must be positive", amount),
                    ));
                }
                Ok(AmountMode::Fixed(amount))
            }
            "randomized" => {
                if !(0.0..=1.0).contains(&self.blend_weight) {
                    return Err(invalid(
                        "trading.blend_weight",
                        format!("blend weight {} must be within [0, 1]", self.blend_weight),
                    ));
                }
                Ok(AmountMode::Randomized {
                    blend_weight: self.blend_weight,
                })
            }
            other => Err(invalid(
                "trading.amount_mode",
                format!("'{}' is not a known mode (fixed or randomized)", other),
            )),
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn parse_address(value: &str, field: &'static str) -> Result<Address, ConfigError> {
    Address::from_str(value.trim())
        .map_err(|e| invalid(field, format!("'{}' is not a valid address: {}", value, e)))
}
