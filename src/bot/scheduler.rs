use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use bigdecimal::{BigDecimal, FromPrimitive};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::balance::BalanceTracker;
use crate::bot::metrics::BotMetrics;
use crate::bot::sampler::CycleSampler;
use crate::trade::{TradeBuilder, TradeExecutor};
use crate::types::{AmountMode, BalanceSnapshot, TokenPair, TransactionState};

#[derive(Debug, Clone)]
pub enum BotCommand {
    Start,
    Stop,
    GetMetrics,
}

#[derive(Debug, Clone)]
pub enum BotEvent {
    Started,
    Stopped,
    Countdown {
        seconds_remaining: u64,
    },
    BlockObserved {
        number: u64,
    },
    BalancesRefreshed {
        snapshot: BalanceSnapshot,
    },
    TradeSubmitted {
        summary: String,
        state: TransactionState,
        tx_hash: Option<String>,
    },
    CycleFailed {
        reason: String,
    },
    Metrics {
        report: String,
    },
}

/// Where the scheduler is in its countdown-and-fire loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    WaitingForInterval { seconds_remaining: u64 },
    CycleReady,
}

/// What a one-second tick did to the countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    Ignored,
    Countdown { seconds_remaining: u64 },
    FireCycle,
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub amount_mode: AmountMode,
    pub min_interval_seconds: u64,
    pub max_interval_seconds: u64,
    pub randomize_direction: bool,
}

/// The countdown state machine. All chain and clock effects live in the
/// driver loop; this type only decides what happens next, which keeps
/// every transition unit-testable.
pub struct SchedulerCore {
    state: SchedulerState,
    pair: TokenPair,
    settings: SchedulerSettings,
    sampler: CycleSampler,
    transaction_state: TransactionState,
    status: String,
}

impl SchedulerCore {
    pub fn new(pair: TokenPair, settings: SchedulerSettings, sampler: CycleSampler) -> Self {
        Self {
            state: SchedulerState::Stopped,
            pair,
            settings,
            sampler,
            transaction_state: TransactionState::New,
            status: "Swap bot idle".to_string(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// The pair the next cycle will trade.
    pub fn pair(&self) -> &TokenPair {
        &self.pair
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transaction_state
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Arms the countdown with a freshly drawn interval. Returns the
    /// interval, or None when the bot is already running.
    pub fn start(&mut self) -> Option<u64> {
        if self.state != SchedulerState::Stopped {
            return None;
        }
        let seconds = self.draw_interval();
        self.state = SchedulerState::WaitingForInterval {
            seconds_remaining: seconds,
        };
        self.status = format!("Next trade in {}s", seconds);
        Some(seconds)
    }

    /// Clears any pending countdown. Returns false when the bot was
    /// already stopped.
    pub fn stop(&mut self) -> bool {
        if self.state == SchedulerState::Stopped {
            return false;
        }
        self.state = SchedulerState::Stopped;
        self.status = "Swap bot stopped".to_string();
        true
    }

    /// Advances the countdown by one second. The cycle fires on the
    /// tick that brings the countdown to zero, so an interval of N
    /// fires after exactly N ticks. An interval of zero fires on the
    /// first tick, like an interval of one.
    pub fn tick(&mut self) -> TickAction {
        match self.state {
            SchedulerState::WaitingForInterval { seconds_remaining } => {
                if seconds_remaining <= 1 {
                    self.state = SchedulerState::CycleReady;
                    TickAction::FireCycle
                } else {
                    let remaining = seconds_remaining - 1;
                    self.state = SchedulerState::WaitingForInterval {
                        seconds_remaining: remaining,
                    };
                    self.status = format!("Next trade in {}s", remaining);
                    TickAction::Countdown {
                        seconds_remaining: remaining,
                    }
                }
            }
            _ => TickAction::Ignored,
        }
    }

    /// Input amount for the cycle about to run, under the configured
    /// sizing mode.
    pub fn draw_amount_in(&mut self, snapshot: &BalanceSnapshot) -> BigDecimal {
        match &self.settings.amount_mode {
            AmountMode::Fixed(amount) => amount.clone(),
            AmountMode::Randomized { blend_weight } => {
                let fraction = self.sampler.draw_fraction(*blend_weight);
                let fraction =
                    BigDecimal::from_f64(fraction).unwrap_or_else(|| BigDecimal::from(0));
                (&snapshot.balance_in * fraction)
                    .with_scale(i64::from(snapshot.pair.input.decimals))
            }
        }
    }

    /// Re-arms the countdown after a cycle and, when direction
    /// randomization is on, flips a coin for the next pair direction.
    /// The first cycle therefore always trades the initial pair.
    pub fn finish_cycle(&mut self) -> u64 {
        if self.settings.randomize_direction && self.sampler.draw_flip() {
            self.pair = self.pair.flipped();
            debug!("Swap direction reversed to {}", self.pair);
        }
        let seconds = self.draw_interval();
        self.state = SchedulerState::WaitingForInterval {
            seconds_remaining: seconds,
        };
        seconds
    }

    pub fn note_transaction(&mut self, state: TransactionState, summary: &str) {
        self.transaction_state = state;
        self.status = format!("Transaction {}: {}", state, summary);
    }

    pub fn record_cycle_error(&mut self, reason: &str) {
        self.status = format!("Cycle failed: {}", reason);
    }

    fn draw_interval(&mut self) -> u64 {
        self.sampler.draw_interval(
            self.settings.min_interval_seconds,
            self.settings.max_interval_seconds,
        )
    }
}

/// Collaborators a trade cycle runs against.
pub struct CycleDeps {
    pub balances: Arc<BalanceTracker>,
    pub builder: Arc<TradeBuilder>,
    pub executor: Arc<TradeExecutor>,
}

/// Handle to the spawned scheduler loop.
pub struct BotScheduler {
    command_sender: mpsc::UnboundedSender<BotCommand>,
    block_sender: mpsc::UnboundedSender<u64>,
    event_sender: broadcast::Sender<BotEvent>,
}

impl BotScheduler {
    pub fn new(core: SchedulerCore, deps: CycleDeps) -> Self {
        let (command_sender, command_receiver) = mpsc::unbounded_channel();
        let (block_sender, block_receiver) = mpsc::unbounded_channel();
        let (event_sender, _event_receiver) = broadcast::channel(100);

        let loop_events = event_sender.clone();
        tokio::spawn(async move {
            run_scheduler(core, deps, command_receiver, block_receiver, loop_events).await;
        });

        Self {
            command_sender,
            block_sender,
            event_sender,
        }
    }

    pub fn send_command(&self, command: BotCommand) -> Result<()> {
        self.command_sender
            .send(command)
            .map_err(|e| anyhow::anyhow!("Failed to send command: {}", e))?;
        Ok(())
    }

    /// Sender the chain watcher pushes new block numbers into.
    pub fn block_sender(&self) -> mpsc::UnboundedSender<u64> {
        self.block_sender.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.event_sender.subscribe()
    }
}

async fn run_scheduler(
    mut core: SchedulerCore,
    deps: CycleDeps,
    mut commands: mpsc::UnboundedReceiver<BotCommand>,
    mut blocks: mpsc::UnboundedReceiver<u64>,
    events: broadcast::Sender<BotEvent>,
) {
    info!("Bot scheduler started");

    let started_at = Instant::now();
    let mut metrics = BotMetrics::new();
    let mut ticker = interval_at(
        Instant::now() + Duration::from_secs(1),
        Duration::from_secs(1),
    );
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            command = commands.recv() => {
                match command {
                    Some(command) => {
                        debug!("Received command: {:?}", command);
                        handle_command(command, &mut core, &mut metrics, started_at, &events);
                    }
                    None => {
                        warn!("Command channel closed, stopping scheduler");
                        break;
                    }
                }
            }

            Some(number) = blocks.recv() => {
                debug!("Observed block {}", number);
                metrics.record_block();
                let _ = events.send(BotEvent::BlockObserved { number });
                spawn_display_refresh(&deps, &core, &events);
            }

            _ = ticker.tick() => {
                match core.tick() {
                    TickAction::Ignored => {}
                    TickAction::Countdown { seconds_remaining } => {
                        debug!("Next trade in {}s", seconds_remaining);
                        let _ = events.send(BotEvent::Countdown { seconds_remaining });
                    }
                    TickAction::FireCycle => {
                        // Awaiting the cycle inline keeps trades
                        // strictly serialized: no tick or block is
                        // looked at until this cycle has settled.
                        run_cycle(&mut core, &deps, &mut metrics, &events).await;
                        let seconds = core.finish_cycle();
                        debug!("Cycle finished, next trade in {}s", seconds);
                    }
                }
            }
        }
    }

    metrics.set_uptime(started_at.elapsed().as_secs());
    info!("{}", metrics.generate_report());
    info!("Bot scheduler stopped");
}

fn handle_command(
    command: BotCommand,
    core: &mut SchedulerCore,
    metrics: &mut BotMetrics,
    started_at: Instant,
    events: &broadcast::Sender<BotEvent>,
) {
    match command {
        BotCommand::Start => match core.start() {
            Some(seconds) => {
                info!("Bot started, first trade in {}s", seconds);
                let _ = events.send(BotEvent::Started);
            }
            None => warn!("Cannot start bot - already running"),
        },
        BotCommand::Stop => {
            if core.stop() {
                info!("Bot stopped");
                let _ = events.send(BotEvent::Stopped);
            } else {
                warn!("Cannot stop bot - not running");
            }
        }
        BotCommand::GetMetrics => {
            metrics.set_uptime(started_at.elapsed().as_secs());
            let _ = events.send(BotEvent::Metrics {
                report: metrics.generate_report(),
            });
        }
    }
}

/// Block-driven refresh keeps displayed balances current without ever
/// delaying the scheduler loop.
fn spawn_display_refresh(
    deps: &CycleDeps,
    core: &SchedulerCore,
    events: &broadcast::Sender<BotEvent>,
) {
    let balances = deps.balances.clone();
    let pair = core.pair().clone();
    let events = events.clone();
    tokio::spawn(async move {
        match balances.refresh(&pair).await {
            Ok(snapshot) => {
                let _ = events.send(BotEvent::BalancesRefreshed { snapshot });
            }
            Err(e) => debug!("Block-driven balance refresh skipped: {}", e),
        }
    });
}

/// One trade cycle: refresh balances, size the trade, price it, submit
/// it. Any failure before submission aborts the cycle; the countdown is
/// re-armed by the caller either way.
async fn run_cycle(
    core: &mut SchedulerCore,
    deps: &CycleDeps,
    metrics: &mut BotMetrics,
    events: &broadcast::Sender<BotEvent>,
) {
    let pair = core.pair().clone();
    metrics.record_cycle();
    info!("Trade cycle fired for {}", pair);

    let snapshot = match deps.balances.refresh(&pair).await {
        Ok(snapshot) => {
            let _ = events.send(BotEvent::BalancesRefreshed {
                snapshot: snapshot.clone(),
            });
            snapshot
        }
        Err(e) => {
            fail_cycle(core, metrics, events, format!("balance refresh failed: {}", e));
            return;
        }
    };

    let amount_in = core.draw_amount_in(&snapshot);
    let trade = match deps.builder.build(amount_in, &pair).await {
        Ok(trade) => trade,
        Err(e) => {
            fail_cycle(core, metrics, events, e.to_string());
            return;
        }
    };

    let summary = trade.to_string();
    core.note_transaction(TransactionState::Sending, &summary);

    match deps.executor.submit(trade).await {
        Ok(outcome) => {
            core.note_transaction(outcome.state, &summary);
            metrics.record_trade(outcome.state);
            match outcome.state {
                TransactionState::Rejected | TransactionState::Failed => {
                    warn!("Trade {} ended {}: {:?}", summary, outcome.state, outcome.detail);
                }
                _ => info!("Trade {} ended {}", summary, outcome.state),
            }
            let tx_hash = outcome.tx_hash.map(|hash| format!("{:?}", hash));
            let _ = events.send(BotEvent::TradeSubmitted {
                summary,
                state: outcome.state,
                tx_hash,
            });
        }
        Err(e) => {
            // nothing was broadcast, so Sending must not stick
            core.note_transaction(TransactionState::Failed, &summary);
            fail_cycle(core, metrics, events, e.to_string());
        }
    }
}

fn fail_cycle(
    core: &mut SchedulerCore,
    metrics: &mut BotMetrics,
    events: &broadcast::Sender<BotEvent>,
    reason: String,
) {
    warn!("Trade cycle failed: {}", reason);
    core.record_cycle_error(&reason);
    metrics.record_cycle_failure(&reason);
    let _ = events.send(BotEvent::CycleFailed { reason });
}
