use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use ethers::{
    abi::Abi,
    contract::Contract,
    prelude::*,
    types::{Address, U256},
};
use tracing::debug;

use crate::{
    chain::ChainClient,
    dex::traits::PricingEngine,
    error::TradeError,
    types::{from_base_units, to_base_units, FeeTier, SwapRoute, TokenPair},
};

const QUOTER_ADDRESS: &str = "0xb27308f9F90D607463bb33eA1BeBb41C27CE5AB6"; // Uniswap V3 Quoter

// Simplified ABI for the quoter contract
const QUOTER_ABI: &str = r#"
[
    {
        "inputs": [
            {"internalType": "address", "name": "tokenIn", "type": "address"},
            {"internalType": "address", "name": "tokenOut", "type": "address"},
            {"internalType": "uint24", "name": "fee", "type": "uint24"},
            {"internalType": "uint256", "name": "amountIn", "type": "uint256"},
            {"internalType": "uint160", "name": "sqrtPriceLimitX96", "type": "uint160"}
        ],
        "name": "quoteExactInputSingle",
        "outputs": [
            {"internalType": "uint256", "name": "amountOut", "type": "uint256"}
        ],
        "stateMutability": "nonpayable",
        "type": "function"
    }
]
"#;

pub struct UniswapQuoter {
    quoter_contract: Contract<Provider<Http>>,
}

impl UniswapQuoter {
    pub fn new(chain: &ChainClient) -> Result<Self> {
        let quoter_address: Address = QUOTER_ADDRESS
            .parse()
            .map_err(|e| anyhow!("invalid quoter address: {}", e))?;
        let quoter_abi: Abi = serde_json::from_str(QUOTER_ABI)?;

        Ok(Self {
            quoter_contract: Contract::new(quoter_address, quoter_abi, chain.provider()),
        })
    }
}

#[async_trait]
impl PricingEngine for UniswapQuoter {
    async fn quote(
        &self,
        amount_in: &BigDecimal,
        pair: &TokenPair,
        fee: FeeTier,
    ) -> Result<SwapRoute, TradeError> {
        debug!("Quoting {} {} on the {:?} fee pool", amount_in, pair, fee);

        let amount_in_raw =
            to_base_units(amount_in, pair.input.decimals).map_err(TradeError::Internal)?;
        if amount_in_raw.is_zero() {
            return Err(TradeError::InvalidAmount {
                amount: amount_in.clone(),
            });
        }

        let call = self
            .quoter_contract
            .method::<_, U256>(
                "quoteExactInputSingle",
                (
                    pair.input.address,
                    pair.output.address,
                    fee.as_u32(),
                    amount_in_raw,
                    U256::zero(),
                ),
            )
            .map_err(|e| TradeError::Internal(anyhow!("failed to encode quote call: {}", e)))?;

        let quoted_amount_out_raw = call.call().await.map_err(|e| TradeError::QuoteUnavailable {
            reason: e.to_string(),
        })?;

        if quoted_amount_out_raw.is_zero() {
            return Err(TradeError::QuoteUnavailable {
                reason: format!("pool quoted zero output for {}", pair),
            });
        }

        let quoted_amount_out = from_base_units(quoted_amount_out_raw, pair.output.decimals)
            .map_err(TradeError::Internal)?;

        Ok(SwapRoute {
            fee,
            amount_in_raw,
            quoted_amount_out_raw,
            quoted_amount_out,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quoter_abi_parses() {
        let abi: Abi = serde_json::from_str(QUOTER_ABI).unwrap();
        let function = abi.function("quoteExactInputSingle").unwrap();
        assert_eq!(function.inputs.len(), 5);
        assert_eq!(function.outputs.len(), 1);
    }

    #[test]
    fn test_quoter_address_parses() {
        assert!(QUOTER_ADDRESS.parse::<Address>().is_ok());
    }
}
