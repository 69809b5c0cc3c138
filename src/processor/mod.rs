pub mod metrics;

pub use metrics::{Metrics, MetricsSnapshot};

use crate::classifier::{Classifier, Confidence, format_amount};
use crate::clock::SharedClock;
use crate::config::SharedSettings;
use crate::ledger::{DualLedger, TransactionRecord, TxStatus};
use crate::reaction::{ReactionEngine, ReactionReport};
use crate::rpc::FetchedTransaction;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// First time this instance saw the signature.
    Recorded {
        record: TransactionRecord,
        reaction: Option<ReactionReport>,
    },
    Duplicate,
}

/// Classify, record in both ledgers, react.
pub struct Processor {
    ledger: DualLedger,
    reactions: Arc<ReactionEngine>,
    settings: SharedSettings,
    clock: SharedClock,
    metrics: Metrics,
}

impl Processor {
    pub fn new(
        ledger: DualLedger,
        reactions: Arc<ReactionEngine>,
        settings: SharedSettings,
        clock: SharedClock,
        metrics: Metrics,
    ) -> Self {
        Self {
            ledger,
            reactions,
            settings,
            clock,
            metrics,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn ledger(&self) -> &DualLedger {
        &self.ledger
    }

    /// Reactions run only when `reactions_enabled` and only for a record
    /// that is new to the shared ledger, so a transaction seen twice (by a
    /// retry or by another instance) never fires twice.
    pub async fn process_transaction(
        &self,
        classifier: &Classifier,
        tx: &FetchedTransaction,
        reactions_enabled: bool,
    ) -> ProcessOutcome {
        let classification = classifier.classify(tx);
        let record = TransactionRecord::new(tx, &classification, self.clock.now());

        let capacity = self.settings.read().await.ledger_capacity;
        let outcome = self.ledger.insert(record.clone(), capacity).await;
        if outcome.any_failed() {
            self.metrics.increment_store_failures();
        }
        if !outcome.is_new() {
            self.metrics.increment_duplicates();
            debug!("{} already recorded", tx.signature);
            return ProcessOutcome::Duplicate;
        }
        self.metrics.increment_processed();

        let marker = if record.confidence == Confidence::Heuristic {
            " (heuristic)"
        } else {
            ""
        };
        let amount = classification
            .amount
            .as_ref()
            .map(format_amount)
            .unwrap_or_else(|| "?".to_string());
        if record.status == TxStatus::Failed {
            info!("❌ Failed tx {} recorded, no reaction", record.signature);
        } else {
            info!(
                "💰 {:?} {} by {}{} - {}",
                record.direction, amount, record.counterparty_address_display, marker, record.signature
            );
        }

        let reaction = if reactions_enabled {
            let report = self.reactions.react(&record).await;
            if report.is_some() {
                self.metrics.increment_reactions();
            }
            report
        } else {
            debug!("reactions suppressed for {}", record.signature);
            None
        };

        ProcessOutcome::Recorded { record, reaction }
    }
}
