use crate::holders::{HolderSnapshot, HolderSnapshotEngine};
use crate::ledger::{DualLedger, LedgerStats, TransactionRecord};
use crate::reaction::{LeaderboardEntry, NotificationRecord, ReactionEngine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything an operator can download in one JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub exported_at: DateTime<Utc>,
    pub transactions: Vec<TransactionRecord>,
    pub frontend_transactions: Vec<TransactionRecord>,
    pub notifications: Vec<NotificationRecord>,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub snapshots: Vec<HolderSnapshot>,
    pub stats: LedgerStats,
}

impl ExportDocument {
    pub async fn collect(
        ledger: &DualLedger,
        reactions: &ReactionEngine,
        holders: &HolderSnapshotEngine,
        capacity: usize,
        exported_at: DateTime<Utc>,
    ) -> Self {
        let shared = ledger.backend.load(capacity).await;
        let frontend = ledger.frontend.load(capacity).await;

        Self {
            exported_at,
            stats: shared.stats(),
            transactions: shared.into_records(),
            frontend_transactions: frontend.into_records(),
            notifications: reactions.notifications().list().await,
            leaderboard: reactions.leaderboard().list().await,
            snapshots: holders.snapshots().await,
        }
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn file_name(&self) -> String {
        format!("launch-watch-export-{}.json", self.exported_at.format("%Y%m%dT%H%M%SZ"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Direction;
    use crate::clock::{ManualClock, SharedClock};
    use crate::config::{Settings, shared_settings};
    use crate::countdown::CountdownEngine;
    use crate::ledger::fixtures::record;
    use crate::reaction::BroadcastNotifier;
    use crate::storage::{LocalStore, Store};
    use chrono::TimeZone;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_export_gathers_every_collection() {
        let shared = Store::new("shared", Arc::new(LocalStore::in_memory()));
        let local = Store::new("local", Arc::new(LocalStore::in_memory()));
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let clock: SharedClock = Arc::new(ManualClock::new(now));
        let settings = shared_settings(Settings::default());
        let countdown = Arc::new(CountdownEngine::new(shared.clone(), local.clone(), clock.clone(), settings.clone()));
        let reactions = ReactionEngine::new(
            shared.clone(),
            countdown,
            Arc::new(BroadcastNotifier::new(4)),
            settings.clone(),
            clock.clone(),
        );
        let holders = HolderSnapshotEngine::new(shared.clone(), "Pool".into(), settings, clock);
        let ledger = DualLedger::new(local, shared);

        let whale = record("whale", Direction::Buy, Some("2000000.00"));
        ledger.insert(whale.clone(), 100).await;
        reactions.react(&whale).await;
        holders.snapshot(crate::holders::SnapshotKind::Manual, "Mint").await.unwrap();

        let doc = ExportDocument::collect(&ledger, &reactions, &holders, 100, now).await;
        assert_eq!(doc.transactions.len(), 1);
        assert_eq!(doc.frontend_transactions.len(), 1);
        assert_eq!(doc.notifications.len(), 1);
        assert_eq!(doc.leaderboard.len(), 1);
        assert_eq!(doc.snapshots.len(), 1);
        assert_eq!(doc.stats.buys, 1);
        assert_eq!(doc.file_name(), "launch-watch-export-20231114T221320Z.json");

        let json = doc.to_pretty_json().unwrap();
        assert!(json.contains("\"frontendTransactions\""));
        assert!(json.contains("\"exportedAt\""));
    }
}
