//! Incremental signature polling bounded by a persisted watermark.

use super::{ChainSource, SignatureInfo};
use crate::error::FetchError;
use crate::storage::{Store, keys};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watermark {
    pub address: String,
    pub signature: String,
}

/// Upper bound on listing pages walked in one poll.
pub const MAX_PAGES: usize = 40;

pub struct SignaturePoller {
    store: Store,
}

impl SignaturePoller {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// The last processed signature for `address`. A watermark recorded for
    /// a different address does not count.
    pub async fn watermark(&self, address: &str) -> Option<String> {
        let mark: Watermark = self.store.get(keys::DETECTION_WATERMARK).await?;
        (mark.address == address).then_some(mark.signature)
    }

    pub async fn advance(&self, address: &str, signature: &str) {
        let mark = Watermark {
            address: address.to_string(),
            signature: signature.to_string(),
        };
        if !self.store.set(keys::DETECTION_WATERMARK, &mark).await {
            warn!("⚠️ Watermark not persisted; {} may be re-fetched", signature);
        }
    }

    /// New signatures for `address`, oldest first. Without a watermark only
    /// the newest `initial_backfill` are returned. Otherwise the listing is
    /// paged backward in `batch`-sized pages until the watermark is reached.
    /// The watermark itself is not moved here; callers advance it as each
    /// signature is handled.
    pub async fn poll(
        &self,
        source: &dyn ChainSource,
        address: &str,
        batch: usize,
        initial_backfill: usize,
    ) -> Result<Vec<SignatureInfo>, FetchError> {
        let watermark = self.watermark(address).await;
        let wanted = match watermark {
            Some(_) => usize::MAX,
            None => initial_backfill,
        };

        let mut fresh: Vec<SignatureInfo> = Vec::new();
        let mut before: Option<String> = None;
        let mut complete = false;

        for _ in 0..MAX_PAGES {
            if fresh.len() >= wanted {
                complete = true;
                break;
            }
            let page = source
                .signatures_for_address(address, before.as_deref(), watermark.as_deref(), batch)
                .await?;
            let full = page.len() >= batch;

            let mut reached_watermark = false;
            for info in page {
                if watermark.as_deref() == Some(info.signature.as_str()) {
                    reached_watermark = true;
                    break;
                }
                fresh.push(info);
            }

            if reached_watermark || !full {
                complete = true;
                break;
            }
            before = fresh.last().map(|info| info.signature.clone());
        }

        match &watermark {
            None => {
                fresh.truncate(initial_backfill);
                if !fresh.is_empty() {
                    info!("📥 No watermark for {}, starting from newest {}", address, fresh.len());
                }
            }
            Some(mark) if !complete => {
                warn!(
                    "⚠️ Watermark {} not reached after {} pages; {} newest signatures kept, older ones are skipped",
                    mark,
                    MAX_PAGES,
                    fresh.len()
                );
            }
            Some(_) => {}
        }

        debug!("poll {}: {} new signatures", address, fresh.len());
        fresh.reverse();
        Ok(fresh)
    }
}
