//! Side effects of a large transaction: notification, leaderboard, countdown
//! extension and a presentation-layer ping. Each effect runs on its own;
//! one failing never stops the rest.

pub mod leaderboard;
pub mod notifications;

pub use leaderboard::{Leaderboard, LeaderboardEntry};
pub use notifications::{NotificationLog, NotificationRecord};

use crate::classifier::Direction;
use crate::clock::SharedClock;
use crate::config::SharedSettings;
use crate::countdown::{CountdownEngine, CountdownKind};
use crate::ledger::{TransactionRecord, TxStatus, UNKNOWN_COUNTERPARTY};
use crate::storage::Store;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// What the presentation layer is told about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LargeTransactionAlert {
    pub signature: String,
    pub direction: Direction,
    pub amount: String,
    pub counterparty: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

pub trait Notifier: Send + Sync {
    /// Returns whether anyone was listening.
    fn notify(&self, alert: &LargeTransactionAlert) -> bool;
}

/// Fans alerts out to every live subscriber, e.g. websocket clients.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<LargeTransactionAlert>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LargeTransactionAlert> {
        self.tx.subscribe()
    }
}

impl Notifier for BroadcastNotifier {
    fn notify(&self, alert: &LargeTransactionAlert) -> bool {
        self.tx.send(alert.clone()).is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionReport {
    pub signature: String,
    pub notification_recorded: bool,
    /// `None` for anything but a buy.
    pub leaderboard_updated: Option<bool>,
    pub countdown_extended: bool,
    pub cap_reached: bool,
    pub notified: bool,
}

pub struct ReactionEngine {
    countdown: Arc<CountdownEngine>,
    notifications: NotificationLog,
    leaderboard: Leaderboard,
    notifier: Arc<dyn Notifier>,
    settings: SharedSettings,
    clock: SharedClock,
}

impl ReactionEngine {
    pub fn new(
        shared: Store,
        countdown: Arc<CountdownEngine>,
        notifier: Arc<dyn Notifier>,
        settings: SharedSettings,
        clock: SharedClock,
    ) -> Self {
        Self {
            countdown,
            notifications: NotificationLog::new(shared.clone()),
            leaderboard: Leaderboard::new(shared),
            notifier,
            settings,
            clock,
        }
    }

    pub fn notifications(&self) -> &NotificationLog {
        &self.notifications
    }

    pub fn leaderboard(&self) -> &Leaderboard {
        &self.leaderboard
    }

    /// Successful records whose resolvable amount is strictly above the
    /// threshold.
    pub fn qualifies(record: &TransactionRecord, threshold: u64) -> bool {
        if record.status != TxStatus::Success {
            return false;
        }
        match record.amount_value() {
            Some(amount) => amount > BigDecimal::from(threshold),
            None => false,
        }
    }

    /// Runs every effect for a qualifying record. `None` means the record
    /// did not qualify and nothing happened.
    pub async fn react(&self, record: &TransactionRecord) -> Option<ReactionReport> {
        let settings = self.settings.read().await.clone();
        if !Self::qualifies(record, settings.large_tx_threshold) {
            debug!("{} below threshold, no reaction", record.signature);
            return None;
        }

        let now = self.clock.now();
        let amount = record.amount.clone().unwrap_or_default();
        let message = format!(
            "Large {:?} of {} by {}",
            record.direction, amount, record.counterparty_address_display
        );
        info!("🐋 {} ({})", message, record.signature);

        let notification_recorded = match self
            .notifications
            .append(
                NotificationRecord {
                    timestamp: now,
                    transaction_ref: record.signature.clone(),
                    message: message.clone(),
                },
                settings.notification_capacity,
            )
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ Notification for {} not recorded: {}", record.signature, e);
                false
            }
        };

        let buyer_known = record.counterparty_address_full != UNKNOWN_COUNTERPARTY;
        let leaderboard_updated = if record.direction == Direction::Buy && buyer_known {
            let entry = LeaderboardEntry {
                address: record.counterparty_address_full.clone(),
                amount: amount.clone(),
                timestamp: now,
            };
            match self.leaderboard.upsert(entry, settings.leaderboard_capacity).await {
                Ok(()) => Some(true),
                Err(e) => {
                    warn!("⚠️ Leaderboard upsert for {} failed: {}", record.signature, e);
                    Some(false)
                }
            }
        } else {
            None
        };

        let extension = self
            .countdown
            .extend(CountdownKind::Launch, settings.launch_extension_secs)
            .await;

        let notified = self.notifier.notify(&LargeTransactionAlert {
            signature: record.signature.clone(),
            direction: record.direction,
            amount,
            counterparty: record.counterparty_address_full.clone(),
            message,
            timestamp: now,
        });

        Some(ReactionReport {
            signature: record.signature.clone(),
            notification_recorded,
            leaderboard_updated,
            countdown_extended: extension.shared_written,
            cap_reached: extension.cap_reached,
            notified,
        })
    }
}
