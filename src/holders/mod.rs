//! Top-holder ranking from a token-program scan, plus snapshot history.

pub mod parser;

use crate::clock::SharedClock;
use crate::config::SharedSettings;
use crate::error::{FetchError, StoreError};
use crate::rpc::{AccountFilter, ChainSource, ProgramAccount, TOKEN_PROGRAM_ID};
use crate::storage::{Store, keys};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use parser::{TOKEN_ACCOUNT_LEN, parse_token_account};
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderRecord {
    pub address: String,
    /// Balance in whole tokens.
    pub balance: BigDecimal,
    pub raw_amount: u64,
    pub rank: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotKind {
    RewardExpiry,
    Manual,
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SnapshotKind::RewardExpiry => "reward-expiry",
            SnapshotKind::Manual => "manual",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HolderSnapshot {
    pub holders: Vec<HolderRecord>,
    pub timestamp: DateTime<Utc>,
    pub token_address: String,
    pub snapshot_id: String,
    pub kind: SnapshotKind,
}

/// The latest ranking, replaced wholesale on every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentHolders {
    pub token_address: String,
    pub holders: Vec<HolderRecord>,
    pub updated_at: DateTime<Utc>,
}

/// Parses, filters and ranks raw token accounts. Unparseable accounts, the
/// pool, zero balances and repeated owners (after their first appearance)
/// are dropped; ranks are dense and 1-based.
pub fn rank_holders(
    accounts: &[ProgramAccount],
    pool_address: &str,
    top: usize,
    decimals: u8,
) -> Vec<HolderRecord> {
    let mut seen = HashSet::new();
    let mut holdings = Vec::new();

    for account in accounts {
        let holding = match parse_token_account(&account.data) {
            Ok(h) => h,
            Err(e) => {
                warn!("⚠️ Skipping token account {}: {}", account.pubkey, e);
                continue;
            }
        };
        if holding.owner == pool_address || account.pubkey == pool_address {
            continue;
        }
        if holding.amount == 0 {
            continue;
        }
        if !seen.insert(holding.owner.clone()) {
            debug!("duplicate owner {} ignored", holding.owner);
            continue;
        }
        holdings.push(holding);
    }

    // Stable, so equal balances keep scan order.
    holdings.sort_by(|a, b| b.amount.cmp(&a.amount));
    holdings.truncate(top);

    holdings
        .into_iter()
        .enumerate()
        .map(|(i, h)| HolderRecord {
            balance: BigDecimal::new(h.amount.into(), decimals as i64),
            raw_amount: h.amount,
            address: h.owner,
            rank: i as u32 + 1,
        })
        .collect()
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct HolderSnapshotEngine {
    shared: Store,
    pool_address: String,
    settings: SharedSettings,
    clock: SharedClock,
    in_flight: AtomicBool,
}

impl HolderSnapshotEngine {
    pub fn new(shared: Store, pool_address: String, settings: SharedSettings, clock: SharedClock) -> Self {
        Self {
            shared,
            pool_address,
            settings,
            clock,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Scans the token program for `token_address` accounts and caches the
    /// ranking under `currentHolders`. Returns `Ok(None)` without touching
    /// the network when another fetch is still running.
    pub async fn fetch_top_holders(
        &self,
        source: &dyn ChainSource,
        token_address: &str,
    ) -> Result<Option<Vec<HolderRecord>>, FetchError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("holder fetch already in flight, skipping");
            return Ok(None);
        }
        let _guard = InFlight(&self.in_flight);

        let mint = Pubkey::from_str(token_address)
            .map_err(|_| FetchError::InvalidAddress(token_address.to_string()))?;
        let filters = [
            AccountFilter::DataSize(TOKEN_ACCOUNT_LEN),
            AccountFilter::Memcmp {
                offset: 0,
                bytes: mint.to_bytes().to_vec(),
            },
        ];

        let accounts = source.program_accounts(TOKEN_PROGRAM_ID, &filters).await?;
        let (top, decimals) = {
            let settings = self.settings.read().await;
            (settings.top_holders, settings.token_decimals)
        };
        let holders = rank_holders(&accounts, &self.pool_address, top, decimals);

        info!("👥 Ranked {} holders from {} token accounts", holders.len(), accounts.len());

        let current = CurrentHolders {
            token_address: token_address.to_string(),
            holders: holders.clone(),
            updated_at: self.clock.now(),
        };
        self.shared.set(keys::CURRENT_HOLDERS, &current).await;

        Ok(Some(holders))
    }

    pub async fn current(&self) -> Option<CurrentHolders> {
        self.shared.get(keys::CURRENT_HOLDERS).await
    }

    pub async fn snapshots(&self) -> Vec<HolderSnapshot> {
        self.shared.get(keys::HOLDER_SNAPSHOTS).await.unwrap_or_default()
    }

    /// Freezes the cached ranking for `token_address` into the history.
    /// A ranking cached for another token is not reused.
    pub async fn snapshot(&self, kind: SnapshotKind, token_address: &str) -> Result<HolderSnapshot, StoreError> {
        let now = self.clock.now();
        let holders = match self.current().await {
            Some(current) if current.token_address == token_address => current.holders,
            _ => Vec::new(),
        };

        let snapshot = HolderSnapshot {
            holders,
            timestamp: now,
            token_address: token_address.to_string(),
            snapshot_id: format!("{}-{}", kind, now.timestamp_millis()),
            kind,
        };

        let capacity = self.settings.read().await.snapshot_capacity;
        let mut history: Vec<HolderSnapshot> =
            self.shared.try_get(keys::HOLDER_SNAPSHOTS).await?.unwrap_or_default();
        history.push(snapshot.clone());
        if history.len() > capacity {
            let excess = history.len() - capacity;
            history.drain(..excess);
        }
        self.shared.try_set(keys::HOLDER_SNAPSHOTS, &history).await?;

        info!(
            "📸 Snapshot {} captured {} holders ({} in history)",
            snapshot.snapshot_id,
            snapshot.holders.len(),
            history.len()
        );
        Ok(snapshot)
    }
}
