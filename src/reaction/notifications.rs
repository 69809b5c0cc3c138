use crate::error::StoreError;
use crate::storage::{Store, keys};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub timestamp: DateTime<Utc>,
    pub transaction_ref: String,
    pub message: String,
}

/// Newest first, independent of the ledger's own eviction.
pub fn push(list: &mut Vec<NotificationRecord>, record: NotificationRecord, capacity: usize) {
    list.insert(0, record);
    list.truncate(capacity);
}

#[derive(Clone)]
pub struct NotificationLog {
    store: Store,
}

impl NotificationLog {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn list(&self) -> Vec<NotificationRecord> {
        self.store.get(keys::NOTIFICATIONS).await.unwrap_or_default()
    }

    pub async fn append(&self, record: NotificationRecord, capacity: usize) -> Result<(), StoreError> {
        let mut list = match self.store.try_get::<Vec<NotificationRecord>>(keys::NOTIFICATIONS).await {
            Ok(list) => list.unwrap_or_default(),
            Err(StoreError::Deserialize { .. }) => {
                warn!("⚠️ [{}] {} unreadable, starting a fresh log", self.store.name(), keys::NOTIFICATIONS);
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        push(&mut list, record, capacity);
        self.store.try_set(keys::NOTIFICATIONS, &list).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn note(i: i64) -> NotificationRecord {
        NotificationRecord {
            timestamp: Utc.timestamp_opt(1_700_000_000 + i, 0).unwrap(),
            transaction_ref: format!("sig-{}", i),
            message: format!("large buy #{}", i),
        }
    }

    #[test]
    fn test_push_caps_newest_first() {
        let mut list = Vec::new();
        for i in 0..60 {
            push(&mut list, note(i), 50);
        }
        assert_eq!(list.len(), 50);
        assert_eq!(list[0].transaction_ref, "sig-59");
        assert_eq!(list[49].transaction_ref, "sig-10");
    }

    #[tokio::test]
    async fn test_log_round_trips_through_store() {
        let log = NotificationLog::new(Store::new("shared", Arc::new(LocalStore::in_memory())));
        log.append(note(1), 50).await.unwrap();
        log.append(note(2), 50).await.unwrap();
        let list = log.list().await;
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].transaction_ref, "sig-2");
    }

    #[tokio::test]
    async fn test_unreadable_log_is_replaced_on_append() {
        let store = Store::new("shared", Arc::new(LocalStore::in_memory()));
        store.try_set(keys::NOTIFICATIONS, &serde_json::json!({ "garbage": true })).await.unwrap();

        let log = NotificationLog::new(store);
        log.append(note(1), 50).await.unwrap();
        assert_eq!(log.list().await, vec![note(1)]);
    }
}
