use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

use crate::chain::ChainProvider;
use crate::error::ChainError;

/// Fans new-block notifications out to a handler, with an explicit
/// handle controlling the subscription lifetime. Exactly one provider
/// subscription exists per handle, however often blocks arrive.
pub struct ChainWatcher {
    provider: Arc<dyn ChainProvider>,
}

impl ChainWatcher {
    pub fn new(provider: Arc<dyn ChainProvider>) -> Self {
        Self { provider }
    }

    /// Starts delivering block numbers to `handler`. Heights that do
    /// not advance past the last delivered one are skipped, so the
    /// handler sees a strictly increasing sequence.
    pub async fn subscribe<F>(&self, mut handler: F) -> Result<SubscriptionHandle, ChainError>
    where
        F: FnMut(u64) + Send + 'static,
    {
        let subscription = self.provider.subscribe_new_blocks().await?;
        let mut blocks = subscription.blocks;
        let shutdown = subscription.shutdown;

        tokio::spawn(async move {
            let mut last_delivered: Option<u64> = None;
            while let Some(number) = blocks.recv().await {
                if let Some(prev) = last_delivered {
                    if number <= prev {
                        debug!("Skipping non-advancing block {} (last {})", number, prev);
                        continue;
                    }
                }
                last_delivered = Some(number);
                handler(number);
            }
            debug!("Block subscription closed");
        });

        Ok(SubscriptionHandle {
            shutdown: Mutex::new(Some(shutdown)),
        })
    }
}

/// Closes the underlying subscription when told to, or when dropped.
pub struct SubscriptionHandle {
    shutdown: Mutex<Option<mpsc::Sender<()>>>,
}

impl SubscriptionHandle {
    /// Stops block delivery. Safe to call more than once, and safe if
    /// no block ever arrived.
    pub fn close(&self) {
        if let Some(shutdown) = self.shutdown.lock().take() {
            let _ = shutdown.try_send(());
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.lock().is_none()
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.close();
    }
}
