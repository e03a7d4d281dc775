//! Periodic reward recomputation.
//!
//! The ticker holds no running total. Each tick calls
//! [`StakingService::get_position`], which recomputes from stored timestamps,
//! so a skipped or delayed tick loses nothing.

use std::sync::Arc;
use std::time::Duration;

use solana_sdk::pubkey::Pubkey;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::service::{PositionView, StakingService};

pub struct RewardTicker {
    handle: JoinHandle<()>,
    rx: watch::Receiver<PositionView>,
}

impl RewardTicker {
    /// Start publishing `identity`'s position every `period`. Must be called
    /// inside a tokio runtime.
    pub fn spawn(service: Arc<StakingService>, identity: Pubkey, period: Duration) -> Self {
        let (tx, rx) = watch::channel(service.get_position(&identity));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let view = service.get_position(&identity);
                tracing::trace!(
                    identity = %identity,
                    pending = view.pending_rewards,
                    "reward tick"
                );
                if tx.send(view).is_err() {
                    // every receiver is gone
                    break;
                }
            }
        });
        Self { handle, rx }
    }

    pub fn subscribe(&self) -> watch::Receiver<PositionView> {
        self.rx.clone()
    }

    pub fn latest(&self) -> PositionView {
        self.rx.borrow().clone()
    }

    /// Stop the local task. Submitted transactions are unaffected; they are
    /// tracked through the store's history.
    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for RewardTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::Harness;
    use seedstable_protocol::constants::SECONDS_PER_YEAR;

    #[tokio::test(start_paused = true)]
    async fn publishes_recomputed_rewards() {
        let h = Harness::new();
        h.fund(1_000_000);
        assert!(h.service.stake(&h.signer, 1_000_000).await.success);

        let ticker = RewardTicker::spawn(h.service.clone(), h.identity(), Duration::from_secs(1));
        let mut rx = ticker.subscribe();
        assert_eq!(ticker.latest().pending_rewards, 0.0);

        h.clock.advance(SECONDS_PER_YEAR);
        rx.changed().await.unwrap();
        rx.changed().await.unwrap();
        let view = rx.borrow_and_update().clone();
        assert_eq!(view.claimable_units, 185_000);
        assert_eq!(view.staked_amount, 1_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_publishing() {
        let h = Harness::new();
        let ticker = RewardTicker::spawn(h.service.clone(), h.identity(), Duration::from_secs(1));
        let mut rx = ticker.subscribe();
        rx.changed().await.unwrap();

        ticker.cancel();
        // sender is dropped once the aborted task is torn down
        assert!(rx.changed().await.is_err());
    }
}
