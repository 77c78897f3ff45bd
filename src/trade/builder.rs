use std::sync::Arc;

use bigdecimal::BigDecimal;
use ethers::types::U256;
use tracing::debug;

use crate::dex::PricingEngine;
use crate::error::TradeError;
use crate::types::{from_base_units, BuiltTrade, FeeTier, TokenPair, TradeIntent};

/// Turns a desired input amount into a fully priced trade with a
/// slippage-protected minimum output.
pub struct TradeBuilder {
    pricing: Arc<dyn PricingEngine>,
    fee: FeeTier,
    slippage_bps: u32,
}

impl TradeBuilder {
    pub fn new(pricing: Arc<dyn PricingEngine>, fee: FeeTier, slippage_bps: u32) -> Self {
        Self {
            pricing,
            fee,
            // 10_000 bps already gives the whole quote away
            slippage_bps: slippage_bps.min(10_000),
        }
    }

    /// The amount must be positive; the pricing engine is not consulted
    /// for amounts that cannot trade.
    pub async fn build(
        &self,
        amount_in: BigDecimal,
        pair: &TokenPair,
    ) -> Result<BuiltTrade, TradeError> {
        if amount_in <= BigDecimal::from(0) {
            return Err(TradeError::InvalidAmount { amount: amount_in });
        }

        let route = self.pricing.quote(&amount_in, pair, self.fee).await?;

        let min_amount_out_raw = route.quoted_amount_out_raw
            * U256::from(10_000 - self.slippage_bps)
            / U256::from(10_000_u32);
        let min_amount_out = from_base_units(min_amount_out_raw, pair.output.decimals)
            .map_err(TradeError::Internal)?;

        let trade = BuiltTrade {
            intent: TradeIntent::new(amount_in, pair.clone()),
            route,
            min_amount_out_raw,
            min_amount_out,
        };
        debug!("Built trade: {}", trade);
        Ok(trade)
    }
}
