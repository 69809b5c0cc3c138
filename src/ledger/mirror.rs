use super::{Ledger, TransactionRecord};
use crate::error::StoreError;
use crate::storage::{Store, keys};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Duplicate,
    Failed,
}

/// A ledger persisted under one store key. Every insert is a fresh
/// read-modify-write so concurrent writers converge on the latest list.
#[derive(Clone)]
pub struct LedgerMirror {
    store: Store,
    key: &'static str,
}

impl LedgerMirror {
    pub fn new(store: Store, key: &'static str) -> Self {
        Self { store, key }
    }

    /// The per-instance view kept in the local store.
    pub fn frontend(local: Store) -> Self {
        Self::new(local, keys::FRONTEND_TRANSACTIONS)
    }

    /// The cross-instance view kept in the shared store.
    pub fn backend(shared: Store) -> Self {
        Self::new(shared, keys::BACKEND_TRANSACTIONS)
    }

    pub fn key(&self) -> &'static str {
        self.key
    }

    pub async fn load(&self, capacity: usize) -> Ledger {
        let records: Vec<TransactionRecord> = self.store.get(self.key).await.unwrap_or_default();
        Ledger::from_records(records, capacity)
    }

    pub async fn insert(&self, record: TransactionRecord, capacity: usize) -> Result<bool, StoreError> {
        let mut ledger = match self.store.try_get::<Vec<TransactionRecord>>(self.key).await {
            Ok(records) => Ledger::from_records(records.unwrap_or_default(), capacity),
            // An unreadable list is replaced rather than blocking every insert.
            Err(StoreError::Deserialize { .. }) => {
                warn!("⚠️ [{}] {} unreadable, starting a fresh ledger", self.store.name(), self.key);
                Ledger::new(capacity)
            }
            Err(e) => return Err(e),
        };

        let signature = record.signature.clone();
        if !ledger.insert(record) {
            debug!("{} already in {}", signature, self.key);
            return Ok(false);
        }

        self.store.try_set(self.key, ledger.records()).await?;
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorOutcome {
    pub frontend: InsertOutcome,
    pub backend: InsertOutcome,
}

impl MirrorOutcome {
    /// Whether this instance is the first to record the transaction. The
    /// shared view decides; the local view only stands in when the shared
    /// store could not be written.
    pub fn is_new(&self) -> bool {
        match self.backend {
            InsertOutcome::Inserted => true,
            InsertOutcome::Duplicate => false,
            InsertOutcome::Failed => self.frontend == InsertOutcome::Inserted,
        }
    }

    pub fn any_failed(&self) -> bool {
        self.frontend == InsertOutcome::Failed || self.backend == InsertOutcome::Failed
    }
}

/// Writes each record into the local and shared ledgers independently.
#[derive(Clone)]
pub struct DualLedger {
    pub frontend: LedgerMirror,
    pub backend: LedgerMirror,
}

impl DualLedger {
    pub fn new(local: Store, shared: Store) -> Self {
        Self {
            frontend: LedgerMirror::frontend(local),
            backend: LedgerMirror::backend(shared),
        }
    }

    pub async fn insert(&self, record: TransactionRecord, capacity: usize) -> MirrorOutcome {
        let frontend = Self::outcome(&self.frontend, self.frontend.insert(record.clone(), capacity).await);
        let backend = Self::outcome(&self.backend, self.backend.insert(record, capacity).await);
        MirrorOutcome { frontend, backend }
    }

    fn outcome(mirror: &LedgerMirror, result: Result<bool, StoreError>) -> InsertOutcome {
        match result {
            Ok(true) => InsertOutcome::Inserted,
            Ok(false) => InsertOutcome::Duplicate,
            Err(e) => {
                warn!("⚠️ Ledger {} insert failed: {}", mirror.key(), e);
                InsertOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Direction;
    use crate::ledger::fixtures::record;
    use crate::storage::LocalStore;
    use std::sync::Arc;

    fn store(name: &'static str) -> Store {
        Store::new(name, Arc::new(LocalStore::in_memory()))
    }

    #[tokio::test]
    async fn test_mirror_persists_and_dedups() {
        let mirror = LedgerMirror::backend(store("shared"));
        assert!(mirror.insert(record("a", Direction::Buy, None), 100).await.unwrap());
        assert!(!mirror.insert(record("a", Direction::Buy, None), 100).await.unwrap());
        assert_eq!(mirror.load(100).await.len(), 1);
    }

    #[tokio::test]
    async fn test_dual_ledger_survives_one_failing_side() {
        // A quota too small for any ledger makes every local write fail.
        let tiny = LocalStore::with_quota(None, 16);
        let dual = DualLedger::new(Store::new("local", Arc::new(tiny)), store("shared"));

        let outcome = dual.insert(record("a", Direction::Buy, Some("5.00")), 100).await;
        assert_eq!(outcome.frontend, InsertOutcome::Failed);
        assert_eq!(outcome.backend, InsertOutcome::Inserted);
        assert!(outcome.is_new());
        assert!(outcome.any_failed());

        let again = dual.insert(record("a", Direction::Buy, Some("5.00")), 100).await;
        assert!(!again.is_new());
    }

    #[tokio::test]
    async fn test_frontend_and_backend_diverge_independently() {
        let local = store("local");
        let shared = store("shared");
        let dual = DualLedger::new(local.clone(), shared.clone());

        // Another instance already recorded "a" in the shared view.
        LedgerMirror::backend(shared).insert(record("a", Direction::Buy, None), 100).await.unwrap();

        let outcome = dual.insert(record("a", Direction::Buy, None), 100).await;
        assert_eq!(outcome.frontend, InsertOutcome::Inserted);
        assert_eq!(outcome.backend, InsertOutcome::Duplicate);
        assert!(!outcome.is_new());
        assert_eq!(LedgerMirror::frontend(local).load(100).await.len(), 1);
    }
}
