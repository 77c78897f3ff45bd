use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::balance::BalanceTracker;
use crate::bot::sampler::CycleSampler;
use crate::bot::scheduler::{
    BotCommand, BotEvent, BotScheduler, CycleDeps, SchedulerCore, SchedulerSettings,
};
use crate::chain::{format_address, ChainClient, WalletConnector};
use crate::config::Config;
use crate::dex::{SwapRouterClient, UniswapQuoter};
use crate::trade::{TradeBuilder, TradeExecutor};
use crate::watcher::{ChainWatcher, SubscriptionHandle};

/// Wires the chain client, DEX clients and scheduler together and owns
/// the block subscription for the lifetime of the bot.
pub struct SwapBot {
    scheduler: BotScheduler,
    subscription: SubscriptionHandle,
}

impl SwapBot {
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing swap bot");

        let chain = Arc::new(ChainClient::new(&config).await?);
        info!("Chain client initialized");

        let wallet = chain.connect().await?;
        info!("Wallet connected: {}", format_address(&wallet));

        let pair = config.tokens.initial_pair(config.chain.chain_id)?;
        info!("Trading pair: {}", pair);

        let balances = Arc::new(BalanceTracker::new(
            chain.clone(),
            config.chain.request_timeout(),
        ));

        let quoter = Arc::new(UniswapQuoter::new(&chain)?);
        let router = Arc::new(SwapRouterClient::new(&chain)?);
        info!("DEX clients initialized");

        let builder = Arc::new(TradeBuilder::new(
            quoter,
            config.trading.fee_tier()?,
            config.trading.slippage_bps,
        ));
        let executor = Arc::new(TradeExecutor::new(router, config.chain.request_timeout()));

        let settings = SchedulerSettings {
            amount_mode: config.trading.amount_mode()?,
            min_interval_seconds: config.trading.min_interval_seconds,
            max_interval_seconds: config.trading.max_interval_seconds,
            randomize_direction: config.trading.randomize_direction,
        };
        let core = SchedulerCore::new(pair, settings, CycleSampler::from_entropy());
        let scheduler = BotScheduler::new(
            core,
            CycleDeps {
                balances,
                builder,
                executor,
            },
        );

        let watcher = ChainWatcher::new(chain.clone());
        let block_sender = scheduler.block_sender();
        let subscription = watcher
            .subscribe(move |number| {
                if block_sender.send(number).is_err() {
                    debug!("Scheduler gone, dropping block {}", number);
                }
            })
            .await?;
        info!("Block subscription established");

        info!("Swap bot initialized successfully");
        Ok(Self {
            scheduler,
            subscription,
        })
    }

    /// Starts trading and forwards scheduler events to the log until
    /// the scheduler loop ends.
    pub async fn run(&self) -> Result<()> {
        let mut events = self.scheduler.subscribe();
        self.scheduler.send_command(BotCommand::Start)?;

        loop {
            match events.recv().await {
                Ok(BotEvent::Started) => info!("Trading started"),
                Ok(BotEvent::Stopped) => info!("Trading stopped"),
                Ok(BotEvent::Countdown { seconds_remaining }) => {
                    debug!("Next trade in {}s", seconds_remaining);
                }
                Ok(BotEvent::BlockObserved { number }) => debug!("New block {}", number),
                Ok(BotEvent::BalancesRefreshed { snapshot }) => info!(
                    "Balances at block {}: {} {} / {} {}",
                    snapshot.as_of_block,
                    snapshot.balance_in,
                    snapshot.pair.input.symbol,
                    snapshot.balance_out,
                    snapshot.pair.output.symbol,
                ),
                Ok(BotEvent::TradeSubmitted {
                    summary,
                    state,
                    tx_hash,
                }) => info!(
                    "Trade {}: {} (tx {})",
                    state,
                    summary,
                    tx_hash.as_deref().unwrap_or("none"),
                ),
                Ok(BotEvent::CycleFailed { reason }) => warn!("Trade cycle failed: {}", reason),
                Ok(BotEvent::Metrics { report }) => info!("{}", report),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        Ok(())
    }

    /// Stops trading and tears down the block subscription.
    pub fn shutdown(&self) {
        info!("Shutting down swap bot");
        if let Err(e) = self.scheduler.send_command(BotCommand::Stop) {
            warn!("Failed to deliver stop command: {}", e);
        }
        self.subscription.close();
    }
}
