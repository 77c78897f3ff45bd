use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use ethers::{
    abi::Abi,
    contract::Contract,
    prelude::*,
    types::{Address, TransactionReceipt, TxHash, U256},
};
use tracing::{debug, info};

use crate::{
    chain::{ChainClient, ChainSigner},
    dex::traits::Broadcaster,
    error::BroadcastError,
    types::{BuiltTrade, TransactionState},
};

const SWAP_ROUTER_ADDRESS: &str = "0xE592427A0AEce92De3Edee1F18E0157C05861564"; // Uniswap V3 SwapRouter

// Deadline given to the pool for including the swap.
const SWAP_DEADLINE_SECONDS: i64 = 600;
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

const SWAP_ROUTER_ABI: &str = r#"
[
    {
        "inputs": [
            {
                "components": [
                    {"internalType": "address", "name": "tokenIn", "type": "address"},
                    {"internalType": "address", "name": "tokenOut", "type": "address"},
                    {"internalType": "uint24", "name": "fee", "type": "uint24"},
                    {"internalType": "address", "name": "recipient", "type": "address"},
                    {"internalType": "uint256", "name": "deadline", "type": "uint256"},
                    {"internalType": "uint256", "name": "amountIn", "type": "uint256"},
                    {"internalType": "uint256", "name": "amountOutMinimum", "type": "uint256"},
                    {"internalType": "uint160", "name": "sqrtPriceLimitX96", "type": "uint160"}
                ],
                "internalType": "struct ISwapRouter.ExactInputSingleParams",
                "name": "params",
                "type": "tuple"
            }
        ],
        "name": "exactInputSingle",
        "outputs": [
            {"internalType": "uint256", "name": "amountOut", "type": "uint256"}
        ],
        "stateMutability": "payable",
        "type": "function"
    }
]
"#;

const ERC20_APPROVAL_ABI: &str = r#"
[
    {
        "inputs": [
            {"internalType": "address", "name": "owner", "type": "address"},
            {"internalType": "address", "name": "spender", "type": "address"}
        ],
        "name": "allowance",
        "outputs": [{"internalType": "uint256", "name": "", "type": "uint256"}],
        "stateMutability": "view",
        "type": "function"
    },
    {
        "inputs": [
            {"internalType": "address", "name": "spender", "type": "address"},
            {"internalType": "uint256", "name": "amount", "type": "uint256"}
        ],
        "name": "approve",
        "outputs": [{"internalType": "bool", "name": "", "type": "bool"}],
        "stateMutability": "nonpayable",
        "type": "function"
    }
]
"#;

/// Submits swaps through the Uniswap V3 router with the connected
/// signing wallet.
pub struct SwapRouterClient {
    signer: Arc<ChainSigner>,
    router_contract: Contract<ChainSigner>,
    erc20_abi: Abi,
}

impl SwapRouterClient {
    /// Fails if no wallet has been connected yet: every transaction
    /// this client produces must be signed.
    pub fn new(chain: &ChainClient) -> Result<Self> {
        let signer = chain
            .signer()
            .ok_or_else(|| anyhow!("wallet must be connected before the router can sign"))?;
        let router_address: Address = SWAP_ROUTER_ADDRESS
            .parse()
            .map_err(|e| anyhow!("invalid router address: {}", e))?;
        let router_abi: Abi = serde_json::from_str(SWAP_ROUTER_ABI)?;
        let erc20_abi: Abi = serde_json::from_str(ERC20_APPROVAL_ABI)?;

        let router_contract = Contract::new(router_address, router_abi, signer.clone());

        Ok(Self {
            signer,
            router_contract,
            erc20_abi,
        })
    }

    /// Grants the router an allowance on the input token when the
    /// current one cannot cover the trade. The approval must be mined
    /// before the swap, otherwise gas estimation for the swap reverts.
    async fn ensure_allowance(&self, trade: &BuiltTrade) -> Result<(), BroadcastError> {
        let owner = self.signer.address();
        let spender = self.router_contract.address();
        let token = Contract::new(
            trade.intent.pair.input.address,
            self.erc20_abi.clone(),
            self.signer.clone(),
        );

        let allowance: U256 = token
            .method::<_, U256>("allowance", (owner, spender))
            .map_err(|e| BroadcastError::Send(format!("failed to encode allowance: {}", e)))?
            .call()
            .await
            .map_err(|e| BroadcastError::Send(format!("allowance check failed: {}", e)))?;

        if allowance >= trade.route.amount_in_raw {
            return Ok(());
        }

        info!(
            "Approving {} for the swap router",
            trade.intent.pair.input.symbol
        );
        let call = token
            .method::<_, bool>("approve", (spender, U256::max_value()))
            .map_err(|e| BroadcastError::Send(format!("failed to encode approve: {}", e)))?;
        let approval_hash = {
            let pending = call
                .send()
                .await
                .map_err(|e| BroadcastError::Send(format!("approve failed: {}", e)))?;
            *pending
        };

        let receipt = self.wait_for_receipt(approval_hash).await?;
        if receipt.status != Some(1.into()) {
            return Err(BroadcastError::Send(format!(
                "approval transaction {:?} reverted",
                approval_hash
            )));
        }
        debug!("Allowance granted in {:?}", approval_hash);
        Ok(())
    }

    /// Polls until a receipt exists. Callers bound the wait with their
    /// own deadline.
    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
    ) -> Result<TransactionReceipt, BroadcastError> {
        loop {
            match self.signer.get_transaction_receipt(tx_hash).await {
                Ok(Some(receipt)) => return Ok(receipt),
                Ok(None) => tokio::time::sleep(RECEIPT_POLL_INTERVAL).await,
                Err(e) => {
                    return Err(BroadcastError::Confirm(format!(
                        "receipt lookup for {:?} failed: {}",
                        tx_hash, e
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl Broadcaster for SwapRouterClient {
    fn signer_address(&self) -> Option<Address> {
        Some(self.signer.address())
    }

    async fn sign_and_send(&self, trade: &BuiltTrade) -> Result<TxHash, BroadcastError> {
        self.ensure_allowance(trade).await?;

        let deadline = U256::from((Utc::now().timestamp() + SWAP_DEADLINE_SECONDS) as u64);
        let params = (
            trade.intent.pair.input.address,
            trade.intent.pair.output.address,
            trade.route.fee.as_u32(),
            self.signer.address(),
            deadline,
            trade.route.amount_in_raw,
            trade.min_amount_out_raw,
            U256::zero(),
        );

        let call = self
            .router_contract
            .method::<_, U256>("exactInputSingle", (params,))
            .map_err(|e| BroadcastError::Send(format!("failed to encode swap: {}", e)))?;

        let tx_hash = {
            let pending = call
                .send()
                .await
                .map_err(|e| BroadcastError::Send(e.to_string()))?;
            *pending
        };

        debug!("Swap broadcast as {:?}", tx_hash);
        Ok(tx_hash)
    }

    async fn confirm(&self, tx_hash: TxHash) -> Result<TransactionState, BroadcastError> {
        let receipt = self.wait_for_receipt(tx_hash).await?;
        match receipt.status {
            Some(status) if status == 1.into() => Ok(TransactionState::Confirmed),
            _ => Ok(TransactionState::Failed),
        }
    }
}
