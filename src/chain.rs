use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use ethers::{
    abi::Abi,
    middleware::SignerMiddleware,
    prelude::*,
    providers::{Http, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, U256},
};
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::ChainError;
use crate::types::{from_base_units, Token};

const ERC20_BALANCE_ABI: &str = r#"[
    {
        "inputs": [{"internalType": "address", "name": "account", "type": "address"}],
        "name": "balanceOf",
        "outputs": [{"internalType": "uint256", "name": "", "type": "uint256"}],
        "stateMutability": "view",
        "type": "function"
    }
]"#;

/// A live stream of block numbers. Dropping `shutdown` (or sending on
/// it) stops the producer, which then closes `blocks`.
pub struct BlockSubscription {
    pub blocks: mpsc::Receiver<u64>,
    pub shutdown: mpsc::Sender<()>,
}

/// Read-only chain access used by the watcher and the balance tracker.
#[async_trait]
pub trait ChainProvider: Send + Sync {
    async fn subscribe_new_blocks(&self) -> Result<BlockSubscription, ChainError>;

    async fn latest_block(&self) -> Result<u64, ChainError>;

    async fn query_balance(&self, owner: Address, token: &Token) -> Result<BigDecimal, ChainError>;

    /// The wallet address, once a wallet has been connected.
    fn connected_address(&self) -> Option<Address>;

    async fn is_available(&self) -> bool;
}

/// Establishes the signing wallet for the session.
#[async_trait]
pub trait WalletConnector: Send + Sync {
    async fn connect(&self) -> Result<Address, ChainError>;
}

pub type ChainSigner = SignerMiddleware<Provider<Http>, LocalWallet>;

pub struct ChainClient {
    provider: Arc<Provider<Http>>,
    chain_id: u64,
    wallet_address: Address,
    wallet_key: String,
    signer: RwLock<Option<Arc<ChainSigner>>>,
    erc20_abi: Abi,
    poll_interval: Duration,
}

impl ChainClient {
    pub async fn new(config: &Config) -> Result<Self, ChainError> {
        info!("Connecting to RPC endpoint: {}", config.chain.rpc_url);

        let provider = Provider::<Http>::try_from(config.chain.rpc_url.as_str())
            .map_err(|e| ChainError::Provider(format!("failed to create provider: {}", e)))?;
        let provider = Arc::new(provider);

        // Verify connection by getting chain ID
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| ChainError::Rpc(format!("failed to get chain id: {}", e)))?;

        if chain_id.as_u64() != config.chain.chain_id {
            return Err(ChainError::Provider(format!(
                "chain id mismatch: expected {}, got {}",
                config.chain.chain_id,
                chain_id.as_u64()
            )));
        }

        let wallet_address = config
            .wallet
            .address()
            .map_err(|e| ChainError::Internal(e.into()))?;
        let erc20_abi: Abi = serde_json::from_str(ERC20_BALANCE_ABI)
            .map_err(|e| ChainError::Provider(format!("invalid erc20 abi: {}", e)))?;

        info!(
            "Connected to network (chain id {})",
            chain_id.as_u64()
        );

        Ok(Self {
            provider,
            chain_id: chain_id.as_u64(),
            wallet_address,
            wallet_key: config.wallet.private_key.clone(),
            signer: RwLock::new(None),
            erc20_abi,
            poll_interval: config.chain.poll_interval(),
        })
    }

    pub fn provider(&self) -> Arc<Provider<Http>> {
        self.provider.clone()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The signing middleware, once `connect` has succeeded.
    pub fn signer(&self) -> Option<Arc<ChainSigner>> {
        self.signer.read().clone()
    }
}

#[async_trait]
impl ChainProvider for ChainClient {
    /// Streams new block numbers by polling the RPC endpoint. Heights
    /// are emitted only when they advance, so duplicates from the
    /// provider are absorbed here.
    async fn subscribe_new_blocks(&self) -> Result<BlockSubscription, ChainError> {
        let provider = self.provider.clone();
        let poll_interval = self.poll_interval;
        let (block_tx, block_rx) = mpsc::channel(64);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            let mut last_seen: Option<u64> = None;

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        debug!("Block polling stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match provider.get_block_number().await {
                            Ok(number) => {
                                let number = number.as_u64();
                                if last_seen.map_or(true, |prev| number > prev) {
                                    last_seen = Some(number);
                                    if block_tx.send(number).await.is_err() {
                                        break;
                                    }
                                }
                            }
                            Err(e) => {
                                debug!("Block number poll failed: {}", e);
                            }
                        }
                    }
                }
            }
        });

        Ok(BlockSubscription {
            blocks: block_rx,
            shutdown: shutdown_tx,
        })
    }

    async fn latest_block(&self) -> Result<u64, ChainError> {
        let number = self
            .provider
            .get_block_number()
            .await
            .map_err(|e| ChainError::Rpc(format!("failed to get block number: {}", e)))?;
        Ok(number.as_u64())
    }

    async fn query_balance(&self, owner: Address, token: &Token) -> Result<BigDecimal, ChainError> {
        let contract = Contract::new(token.address, self.erc20_abi.clone(), self.provider.clone());
        let raw: U256 = contract
            .method::<_, U256>("balanceOf", (owner,))
            .map_err(|e| ChainError::Rpc(format!("failed to encode balanceOf: {}", e)))?
            .call()
            .await
            .map_err(|e| {
                ChainError::Rpc(format!(
                    "balanceOf({}) failed for {}: {}",
                    format_address(&owner),
                    token.symbol,
                    e
                ))
            })?;
        from_base_units(raw, token.decimals).map_err(ChainError::Internal)
    }

    fn connected_address(&self) -> Option<Address> {
        self.signer.read().as_ref().map(|s| s.address())
    }

    async fn is_available(&self) -> bool {
        self.provider.get_block_number().await.is_ok()
    }
}

#[async_trait]
impl WalletConnector for ChainClient {
    /// Builds the signing wallet from the configured key and verifies
    /// that it controls the configured address.
    async fn connect(&self) -> Result<Address, ChainError> {
        let wallet = self
            .wallet_key
            .parse::<LocalWallet>()
            .map_err(|e| ChainError::WalletKey(e.to_string()))?
            .with_chain_id(self.chain_id);
        let derived = wallet.address();

        if derived != self.wallet_address {
            return Err(ChainError::WalletMismatch {
                expected: self.wallet_address,
                actual: derived,
            });
        }

        let signer = SignerMiddleware::new((*self.provider).clone(), wallet);
        *self.signer.write() = Some(Arc::new(signer));

        Ok(derived)
    }
}

pub fn format_address(address: &Address) -> String {
    format!("{:?}", address)
}
