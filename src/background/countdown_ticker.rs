use super::detection::DetectionControl;
use super::scheduler::{CancelToken, Scheduler, job};
use crate::countdown::{CountdownEngine, CountdownKind, CountdownTick};
use crate::holders::{HolderSnapshotEngine, SnapshotKind};
use crate::storage::{Store, keys};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Drives both countdowns at 1 Hz and runs each kind's expiry side effect.
pub struct CountdownTicker {
    countdown: Arc<CountdownEngine>,
    holders: Arc<HolderSnapshotEngine>,
    shared: Store,
    default_token: String,
}

impl CountdownTicker {
    pub fn new(
        countdown: Arc<CountdownEngine>,
        holders: Arc<HolderSnapshotEngine>,
        shared: Store,
        default_token: String,
    ) -> Self {
        Self {
            countdown,
            holders,
            shared,
            default_token,
        }
    }

    /// The token being watched right now, falling back to the configured one.
    async fn token_address(&self) -> String {
        self.shared
            .get::<DetectionControl>(keys::DETECTION_CONTROL)
            .await
            .map(|c| c.token_address)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| self.default_token.clone())
    }

    pub async fn tick_once(&self) -> Vec<(CountdownKind, CountdownTick)> {
        let mut ticks = Vec::with_capacity(CountdownKind::ALL.len());

        for kind in CountdownKind::ALL {
            let tick = self.countdown.tick(kind).await;
            if let CountdownTick::Expired { .. } = &tick {
                self.on_expired(kind).await;
            }
            ticks.push((kind, tick));
        }

        ticks
    }

    async fn on_expired(&self, kind: CountdownKind) {
        match kind {
            CountdownKind::Launch => {
                info!("🚀 Launch countdown reached zero. Next window armed.");
            }
            CountdownKind::HoldingReward => {
                let token = self.token_address().await;
                match self.holders.snapshot(SnapshotKind::RewardExpiry, &token).await {
                    Ok(snapshot) => info!(
                        "🎁 Holding reward window closed, snapshot {} taken",
                        snapshot.snapshot_id
                    ),
                    Err(e) => error!("❌ Reward-expiry snapshot failed: {}", e),
                }
            }
        }
    }
}

pub fn start_countdown_ticker(ticker: Arc<CountdownTicker>, scheduler: &dyn Scheduler) -> CancelToken {
    info!("⏱️ Countdown ticker started ({}s)", TICK_INTERVAL.as_secs());
    scheduler.schedule(
        TICK_INTERVAL,
        job(move || {
            let ticker = ticker.clone();
            async move {
                ticker.tick_once().await;
            }
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::scheduler::ManualScheduler;
    use crate::clock::{ManualClock, SharedClock};
    use crate::config::{Settings, shared_settings};
    use crate::storage::LocalStore;
    use chrono::{TimeZone, Utc};

    struct Harness {
        ticker: Arc<CountdownTicker>,
        countdown: Arc<CountdownEngine>,
        holders: Arc<HolderSnapshotEngine>,
        clock: ManualClock,
    }

    fn harness() -> Harness {
        let shared = Store::new("shared", Arc::new(LocalStore::in_memory()));
        let local = Store::new("local", Arc::new(LocalStore::in_memory()));
        let clock = ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap());
        let shared_clock: SharedClock = Arc::new(clock.clone());
        let settings = shared_settings(Settings::default());
        let countdown = Arc::new(CountdownEngine::new(
            shared.clone(),
            local,
            shared_clock.clone(),
            settings.clone(),
        ));
        let holders = Arc::new(HolderSnapshotEngine::new(
            shared.clone(),
            "Pool".into(),
            settings,
            shared_clock,
        ));
        let ticker = Arc::new(CountdownTicker::new(
            countdown.clone(),
            holders.clone(),
            shared,
            "Mint".into(),
        ));
        Harness {
            ticker,
            countdown,
            holders,
            clock,
        }
    }

    #[tokio::test]
    async fn test_reward_expiry_takes_snapshot_and_rearms() {
        let h = harness();
        h.countdown.reset(CountdownKind::HoldingReward, Some(2)).await.unwrap();
        h.clock.advance(chrono::Duration::seconds(3));

        let ticks = h.ticker.tick_once().await;
        assert!(matches!(ticks[0], (CountdownKind::Launch, CountdownTick::Active { .. })));
        assert!(matches!(ticks[1], (CountdownKind::HoldingReward, CountdownTick::Expired { .. })));

        let snapshots = h.holders.snapshots().await;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].kind, SnapshotKind::RewardExpiry);
        assert_eq!(snapshots[0].token_address, "Mint");
        assert_eq!(h.countdown.remaining(CountdownKind::HoldingReward).await.num_seconds(), 3600);

        // Re-armed, so the next tick is quiet.
        h.ticker.tick_once().await;
        assert_eq!(h.holders.snapshots().await.len(), 1);
    }

    #[tokio::test]
    async fn test_launch_expiry_has_no_snapshot() {
        let h = harness();
        h.countdown.reset(CountdownKind::Launch, Some(1)).await.unwrap();
        h.clock.advance(chrono::Duration::seconds(1));

        let ticks = h.ticker.tick_once().await;
        assert!(matches!(ticks[0], (CountdownKind::Launch, CountdownTick::Expired { .. })));
        assert!(h.holders.snapshots().await.is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_through_scheduler() {
        let h = harness();
        let scheduler = ManualScheduler::new();
        let token = start_countdown_ticker(h.ticker.clone(), &scheduler);
        h.countdown.reset(CountdownKind::HoldingReward, Some(1)).await.unwrap();
        h.clock.advance(chrono::Duration::seconds(5));

        scheduler.fire_every(TICK_INTERVAL).await;
        assert_eq!(h.holders.snapshots().await.len(), 1);

        token.cancel();
        assert_eq!(scheduler.live_count(), 0);
    }
}
