use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone, Default)]
pub struct Metrics {
    pub transactions_processed: Arc<AtomicU64>,
    pub duplicates_skipped: Arc<AtomicU64>,
    pub parse_failures: Arc<AtomicU64>,
    pub reactions_fired: Arc<AtomicU64>,
    pub store_write_failures: Arc<AtomicU64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_processed(&self) {
        self.transactions_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_duplicates(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_parse_failures(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_reactions(&self) {
        self.reactions_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_store_failures(&self) {
        self.store_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_processed: self.transactions_processed.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            reactions_fired: self.reactions_fired.load(Ordering::Relaxed),
            store_write_failures: self.store_write_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub transactions_processed: u64,
    pub duplicates_skipped: u64,
    pub parse_failures: u64,
    pub reactions_fired: u64,
    pub store_write_failures: u64,
}
