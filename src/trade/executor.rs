use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::dex::Broadcaster;
use crate::error::TradeError;
use crate::types::{BuiltTrade, TradeOutcome};

/// Pushes one built trade through signing, broadcast and settlement.
/// At most one trade is in flight at a time because the scheduler
/// awaits each submission before arming the next cycle.
pub struct TradeExecutor {
    broadcaster: Arc<dyn Broadcaster>,
    deadline: Duration,
}

impl TradeExecutor {
    pub fn new(broadcaster: Arc<dyn Broadcaster>, deadline: Duration) -> Self {
        Self {
            broadcaster,
            deadline,
        }
    }

    /// Every returned outcome is final for the bot: a trade still
    /// unconfirmed at the deadline is reported as in flight and never
    /// re-polled or retried.
    pub async fn submit(&self, trade: BuiltTrade) -> Result<TradeOutcome, TradeError> {
        if self.broadcaster.signer_address().is_none() {
            return Err(TradeError::NoSigner);
        }
        debug!("Submitting trade: {}", trade);

        let tx_hash = match timeout(self.deadline, self.broadcaster.sign_and_send(&trade)).await {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => {
                warn!("Trade rejected before broadcast: {}", e);
                return Ok(TradeOutcome::rejected(e.to_string()));
            }
            Err(_) => {
                warn!("Trade submission timed out before broadcast");
                return Ok(TradeOutcome::rejected(
                    "submission deadline elapsed before broadcast",
                ));
            }
        };

        info!("Transaction broadcast: {:?}", tx_hash);

        match timeout(self.deadline, self.broadcaster.confirm(tx_hash)).await {
            Ok(Ok(state)) => {
                info!("Transaction {:?} settled as {}", tx_hash, state);
                Ok(TradeOutcome::settled(state, tx_hash))
            }
            Ok(Err(e)) => {
                warn!("Confirmation of {:?} could not be observed: {}", tx_hash, e);
                Ok(TradeOutcome::in_flight(tx_hash, e.to_string()))
            }
            Err(_) => {
                warn!("Transaction {:?} still unconfirmed at deadline", tx_hash);
                Ok(TradeOutcome::in_flight(tx_hash, "unconfirmed at deadline"))
            }
        }
    }
}
