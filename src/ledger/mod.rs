//! Deduplicated, capacity-bounded transaction history, newest first.

pub mod mirror;

pub use mirror::{DualLedger, InsertOutcome, LedgerMirror, MirrorOutcome};

use crate::classifier::{Classification, Confidence, Direction, display_address, format_amount};
use crate::rpc::FetchedTransaction;
use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const UNKNOWN_COUNTERPARTY: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<DateTime<Utc>>,
    pub direction: Direction,
    /// Two-place decimal string; `None` when unresolvable.
    pub amount: Option<String>,
    pub counterparty_address_full: String,
    pub counterparty_address_display: String,
    pub status: TxStatus,
    pub classified_by: String,
    pub confidence: Confidence,
    pub detected_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(tx: &FetchedTransaction, classification: &Classification, detected_at: DateTime<Utc>) -> Self {
        let counterparty = classification
            .counterparty
            .clone()
            .unwrap_or_else(|| UNKNOWN_COUNTERPARTY.to_string());

        Self {
            signature: tx.signature.clone(),
            slot: tx.slot,
            block_time: tx.block_time.and_then(|t| Utc.timestamp_opt(t, 0).single()),
            direction: classification.direction,
            amount: classification.amount.as_ref().map(format_amount),
            counterparty_address_display: display_address(&counterparty),
            counterparty_address_full: counterparty,
            status: if tx.success {
                TxStatus::Success
            } else {
                TxStatus::Failed
            },
            classified_by: classification.classified_by.to_string(),
            confidence: classification.confidence,
            detected_at,
        }
    }

    pub fn amount_value(&self) -> Option<BigDecimal> {
        self.amount.as_deref().and_then(|a| BigDecimal::from_str(a).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub total: usize,
    pub buys: usize,
    pub sells: usize,
    pub transfers: usize,
    pub unknown: usize,
    pub failed: usize,
    pub buy_volume: String,
    pub sell_volume: String,
    pub largest_amount: Option<String>,
    pub last_signature: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ledger {
    capacity: usize,
    records: Vec<TransactionRecord>,
}

impl Ledger {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: Vec::new(),
        }
    }

    /// Rebuilds a ledger from stored records, dropping any duplicate or
    /// overflow a concurrent writer may have left behind.
    pub fn from_records(records: Vec<TransactionRecord>, capacity: usize) -> Self {
        let mut ledger = Self::new(capacity);
        for record in records {
            if ledger.records.len() >= capacity {
                break;
            }
            if !ledger.contains(&record.signature) {
                ledger.records.push(record);
            }
        }
        ledger
    }

    /// Prepends unless the signature is already present. Returns whether the
    /// record was added.
    pub fn insert(&mut self, record: TransactionRecord) -> bool {
        if self.contains(&record.signature) {
            return false;
        }
        self.records.insert(0, record);
        self.records.truncate(self.capacity);
        true
    }

    pub fn contains(&self, signature: &str) -> bool {
        self.records.iter().any(|r| r.signature == signature)
    }

    pub fn list(&self, limit: usize) -> &[TransactionRecord] {
        &self.records[..limit.min(self.records.len())]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[TransactionRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<TransactionRecord> {
        self.records
    }

    pub fn stats(&self) -> LedgerStats {
        let mut stats = LedgerStats {
            total: self.records.len(),
            buys: 0,
            sells: 0,
            transfers: 0,
            unknown: 0,
            failed: 0,
            buy_volume: String::new(),
            sell_volume: String::new(),
            largest_amount: None,
            last_signature: self.records.first().map(|r| r.signature.clone()),
        };
        let mut buy_volume = BigDecimal::zero();
        let mut sell_volume = BigDecimal::zero();
        let mut largest: Option<BigDecimal> = None;

        for record in &self.records {
            if record.status == TxStatus::Failed {
                stats.failed += 1;
                continue;
            }
            let amount = record.amount_value();
            match record.direction {
                Direction::Buy => {
                    stats.buys += 1;
                    if let Some(a) = &amount {
                        buy_volume += a;
                    }
                }
                Direction::Sell => {
                    stats.sells += 1;
                    if let Some(a) = &amount {
                        sell_volume += a;
                    }
                }
                Direction::Transfer => stats.transfers += 1,
                Direction::Unknown => stats.unknown += 1,
            }
            if let Some(a) = amount {
                if largest.as_ref().is_none_or(|l| a > *l) {
                    largest = Some(a);
                }
            }
        }

        stats.buy_volume = format_amount(&buy_volume);
        stats.sell_volume = format_amount(&sell_volume);
        stats.largest_amount = largest.as_ref().map(format_amount);
        stats
    }
}
