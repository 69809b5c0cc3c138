#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use launch_watch::api::AppState;
use launch_watch::background::{DetectionService, ManualScheduler, SettingsSync};
use launch_watch::clock::{ManualClock, SharedClock};
use launch_watch::config::{Settings, SharedSettings, shared_settings};
use launch_watch::countdown::CountdownEngine;
use launch_watch::error::{ConnectError, FetchError};
use launch_watch::holders::HolderSnapshotEngine;
use launch_watch::ledger::DualLedger;
use launch_watch::points::{DEFAULT_POINTS_PER_TOKEN, InMemoryPointsLedger};
use launch_watch::processor::{Metrics, Processor};
use launch_watch::reaction::{BroadcastNotifier, ReactionEngine};
use launch_watch::rpc::{
    AccountFilter, AccountKey, ChainSource, ConnectionMonitor, Connector, FetchedTransaction, ProgramAccount,
    SignatureInfo, TokenBalance,
};
use launch_watch::storage::{LocalStore, Store};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

pub const RPC: &str = "https://rpc.example";
pub const TOKEN: &str = "So11111111111111111111111111111111111111112";
pub const POOL: &str = "58oQChx4yWmvKdwLLZzBi4ChoCc2fqCUWBkwMihLYQo2";
pub const BUYER: &str = "9WzDXwBbmkg8ZTbNMqUxvQRAyrZzDsGYdLVL9zYtAWWM";
pub const POOL_VAULT: &str = "7YttLkHDoNj9wyDur5pM1ejNaAvT9X4eqaYcHQqtj2G5";
pub const BUYER_ATA: &str = "3Kz8Qv6pCq5bL4cJm9ZxS2yR1wT7nV8hF4gD6eA5uB3k";

pub fn start_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

fn key(pubkey: &str, signer: bool, writable: bool) -> AccountKey {
    AccountKey {
        pubkey: pubkey.to_string(),
        signer,
        writable,
    }
}

fn balance(account_index: usize, owner: &str, amount: &str) -> TokenBalance {
    TokenBalance {
        account_index,
        mint: TOKEN.to_string(),
        owner: Some(owner.to_string()),
        amount: BigDecimal::from_str(amount).unwrap(),
    }
}

/// A two-party swap between `BUYER` and the pool, amounts in whole tokens.
pub fn swap(signature: &str, pool_pre: &str, pool_post: &str, wallet_pre: &str, wallet_post: &str) -> FetchedTransaction {
    FetchedTransaction {
        signature: signature.to_string(),
        slot: 250_000_000,
        block_time: Some(1_700_000_000),
        success: true,
        account_keys: vec![
            key(BUYER, true, true),
            key(POOL_VAULT, false, true),
            key(BUYER_ATA, false, true),
            key(TOKEN, false, false),
        ],
        pre_token_balances: vec![balance(1, POOL, pool_pre), balance(2, BUYER, wallet_pre)],
        post_token_balances: vec![balance(1, POOL, pool_post), balance(2, BUYER, wallet_post)],
    }
}

/// Chain double: a newest-first signature listing, a transaction table and
/// a set of program accounts. Listed signatures with no transaction behind
/// them fail as a transient RPC error.
#[derive(Default)]
pub struct ScriptedChain {
    listing: Mutex<Vec<SignatureInfo>>,
    transactions: Mutex<HashMap<String, FetchedTransaction>>,
    accounts: Mutex<Vec<ProgramAccount>>,
}

impl ScriptedChain {
    /// Lists `tx` as the newest signature.
    pub fn push(&self, tx: FetchedTransaction) {
        self.list(&tx.signature);
        self.add_transaction(tx);
    }

    pub fn list(&self, signature: &str) {
        self.listing.lock().unwrap().insert(
            0,
            SignatureInfo {
                signature: signature.to_string(),
                slot: 250_000_000,
                block_time: Some(1_700_000_000),
                failed: false,
            },
        );
    }

    pub fn add_transaction(&self, tx: FetchedTransaction) {
        self.transactions.lock().unwrap().insert(tx.signature.clone(), tx);
    }

    pub fn set_accounts(&self, accounts: Vec<ProgramAccount>) {
        *self.accounts.lock().unwrap() = accounts;
    }
}

#[async_trait]
impl ChainSource for ScriptedChain {
    async fn version(&self) -> Result<String, FetchError> {
        Ok("2.3.13".into())
    }

    async fn slot(&self) -> Result<u64, FetchError> {
        Ok(250_000_000)
    }

    async fn signatures_for_address(
        &self,
        _address: &str,
        before: Option<&str>,
        until: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SignatureInfo>, FetchError> {
        let listing = self.listing.lock().unwrap();
        let start = match before {
            Some(before) => match listing.iter().position(|s| s.signature == before) {
                Some(i) => i + 1,
                None => return Ok(Vec::new()),
            },
            None => 0,
        };
        Ok(listing[start..]
            .iter()
            .take_while(|s| Some(s.signature.as_str()) != until)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn transaction(&self, signature: &str) -> Result<FetchedTransaction, FetchError> {
        self.transactions
            .lock()
            .unwrap()
            .get(signature)
            .cloned()
            .ok_or_else(|| FetchError::Rpc {
                method: "getTransaction",
                reason: "not yet available".into(),
            })
    }

    async fn program_accounts(
        &self,
        _program: &str,
        filters: &[AccountFilter],
    ) -> Result<Vec<ProgramAccount>, FetchError> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| {
                filters.iter().all(|f| match f {
                    AccountFilter::DataSize(size) => a.data.len() as u64 == *size,
                    AccountFilter::Memcmp { offset, bytes } => {
                        a.data.get(*offset..*offset + bytes.len()) == Some(bytes.as_slice())
                    }
                })
            })
            .cloned()
            .collect())
    }
}

pub struct ScriptedConnector(pub Arc<ScriptedChain>);

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Arc<dyn ChainSource>, ConnectError> {
        let source: Arc<dyn ChainSource> = self.0.clone();
        Ok(source)
    }
}

/// Every engine wired the way the daemon wires them, over in-memory stores,
/// a manual clock and a manual scheduler.
pub struct Harness {
    pub shared: Store,
    pub local: Store,
    pub clock: ManualClock,
    pub scheduler: ManualScheduler,
    pub chain: Arc<ScriptedChain>,
    pub settings: SharedSettings,
    pub notifier: BroadcastNotifier,
    pub countdown: Arc<CountdownEngine>,
    pub reactions: Arc<ReactionEngine>,
    pub holders: Arc<HolderSnapshotEngine>,
    pub processor: Arc<Processor>,
    pub detection: Arc<DetectionService>,
    pub settings_sync: Arc<SettingsSync>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_shared(Store::new("shared", Arc::new(LocalStore::in_memory())))
    }

    /// A second instance sees the same shared store but keeps its own local
    /// store, clock and scheduler.
    pub fn with_shared(shared: Store) -> Self {
        let local = Store::new("local", Arc::new(LocalStore::in_memory()));
        let clock = ManualClock::new(start_time());
        let shared_clock: SharedClock = Arc::new(clock.clone());
        let scheduler = ManualScheduler::new();
        let chain = Arc::new(ScriptedChain::default());
        let settings = shared_settings(Settings::default());
        let notifier = BroadcastNotifier::new(16);

        let countdown = Arc::new(CountdownEngine::new(
            shared.clone(),
            local.clone(),
            shared_clock.clone(),
            settings.clone(),
        ));
        let reactions = Arc::new(ReactionEngine::new(
            shared.clone(),
            countdown.clone(),
            Arc::new(notifier.clone()),
            settings.clone(),
            shared_clock.clone(),
        ));
        let holders = Arc::new(HolderSnapshotEngine::new(
            shared.clone(),
            POOL.to_string(),
            settings.clone(),
            shared_clock.clone(),
        ));
        let processor = Arc::new(Processor::new(
            DualLedger::new(local.clone(), shared.clone()),
            reactions.clone(),
            settings.clone(),
            shared_clock.clone(),
            Metrics::new(),
        ));
        let detection = Arc::new(DetectionService::new(
            shared.clone(),
            local.clone(),
            Arc::new(ScriptedConnector(chain.clone())),
            Arc::new(scheduler.clone()),
            processor.clone(),
            holders.clone(),
            ConnectionMonitor::new(),
            settings.clone(),
            shared_clock,
            POOL.to_string(),
        ));
        let settings_sync = Arc::new(SettingsSync::new(settings.clone(), detection.clone()));

        Self {
            shared,
            local,
            clock,
            scheduler,
            chain,
            settings,
            notifier,
            countdown,
            reactions,
            holders,
            processor,
            detection,
            settings_sync,
        }
    }

    pub fn app_state(&self) -> AppState {
        AppState {
            shared: self.shared.clone(),
            countdown: self.countdown.clone(),
            detection: self.detection.clone(),
            processor: self.processor.clone(),
            reactions: self.reactions.clone(),
            holders: self.holders.clone(),
            notifier: self.notifier.clone(),
            settings: self.settings.clone(),
            settings_sync: self.settings_sync.clone(),
            clock: Arc::new(self.clock.clone()),
            points: Some(Arc::new(InMemoryPointsLedger::new(DEFAULT_POINTS_PER_TOKEN))),
            default_token: TOKEN.to_string(),
        }
    }
}
