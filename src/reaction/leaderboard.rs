use crate::error::StoreError;
use crate::storage::{Store, keys};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub address: String,
    pub amount: String,
    pub timestamp: DateTime<Utc>,
}

/// Keyed by address, most recent first. A known address is refreshed and
/// moved to the front; a new one is prepended and the oldest entry falls
/// off past `capacity`.
pub fn upsert(entries: &mut Vec<LeaderboardEntry>, entry: LeaderboardEntry, capacity: usize) {
    entries.retain(|e| e.address != entry.address);
    entries.insert(0, entry);
    entries.truncate(capacity);
}

#[derive(Clone)]
pub struct Leaderboard {
    store: Store,
}

impl Leaderboard {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Vec<LeaderboardEntry> {
        self.store.get(keys::SUCCESS_ADDRESSES).await.unwrap_or_default()
    }

    pub async fn upsert(&self, entry: LeaderboardEntry, capacity: usize) -> Result<(), StoreError> {
        let mut entries = match self.store.try_get::<Vec<LeaderboardEntry>>(keys::SUCCESS_ADDRESSES).await {
            Ok(entries) => entries.unwrap_or_default(),
            Err(StoreError::Deserialize { .. }) => {
                warn!("⚠️ [{}] {} unreadable, starting a fresh leaderboard", self.store.name(), keys::SUCCESS_ADDRESSES);
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        upsert(&mut entries, entry, capacity);
        self.store.try_set(keys::SUCCESS_ADDRESSES, &entries).await
    }
}
