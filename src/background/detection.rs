//! Start/stop control and the polling loop that feeds the processor.
//!
//! The `detectionControl` document in the shared store is the only switch.
//! Every tick re-reads it, so stopping detection from any instance quiets
//! all of them by the next tick.

use super::scheduler::{CancelToken, Scheduler, job};
use crate::classifier::{ClassificationContext, Classifier};
use crate::clock::SharedClock;
use crate::config::{SharedSettings, validate_address, validate_rpc_url};
use crate::error::ValidationError;
use crate::holders::HolderSnapshotEngine;
use crate::processor::{ProcessOutcome, Processor};
use crate::rpc::{ChainSource, ConnectionMonitor, Connector, SignaturePoller};
use crate::storage::{Store, keys};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionControl {
    pub is_running: bool,
    pub rpc_url: String,
    pub token_address: String,
    pub start_timestamp: Option<DateTime<Utc>>,
}

/// What one polling tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TickReport {
    pub fetched: usize,
    pub recorded: usize,
    pub duplicates: usize,
    pub reactions: usize,
    pub skipped: usize,
    /// A transient failure stopped the tick before the end of the batch.
    pub halted: bool,
}

struct Connection {
    url: String,
    source: Arc<dyn ChainSource>,
}

/// Clears the `isUpdating` flag when a tick ends, however it ends.
struct Updating<'a>(&'a AtomicBool);

impl Drop for Updating<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct DetectionService {
    shared: Store,
    connector: Arc<dyn Connector>,
    scheduler: Arc<dyn Scheduler>,
    poller: SignaturePoller,
    processor: Arc<Processor>,
    holders: Arc<HolderSnapshotEngine>,
    monitor: ConnectionMonitor,
    settings: SharedSettings,
    clock: SharedClock,
    pool_address: String,
    connection: tokio::sync::Mutex<Option<Connection>>,
    classifier: tokio::sync::Mutex<Option<Arc<Classifier>>>,
    timers: Mutex<Vec<CancelToken>>,
    updating: AtomicBool,
}

impl DetectionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        shared: Store,
        local: Store,
        connector: Arc<dyn Connector>,
        scheduler: Arc<dyn Scheduler>,
        processor: Arc<Processor>,
        holders: Arc<HolderSnapshotEngine>,
        monitor: ConnectionMonitor,
        settings: SharedSettings,
        clock: SharedClock,
        pool_address: String,
    ) -> Self {
        Self {
            shared,
            connector,
            scheduler,
            poller: SignaturePoller::new(local),
            processor,
            holders,
            monitor,
            settings,
            clock,
            pool_address,
            connection: tokio::sync::Mutex::new(None),
            classifier: tokio::sync::Mutex::new(None),
            timers: Mutex::new(Vec::new()),
            updating: AtomicBool::new(false),
        }
    }

    pub fn monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    pub async fn control(&self) -> Option<DetectionControl> {
        self.shared.get(keys::DETECTION_CONTROL).await
    }

    pub async fn is_running(&self) -> bool {
        self.control().await.is_some_and(|c| c.is_running)
    }

    pub fn timers_active(&self) -> bool {
        !self.timers.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    /// Validates, publishes the control document, connects and schedules
    /// polling plus holder refresh. A failed handshake is not an error here;
    /// the next tick retries it.
    pub async fn start(self: &Arc<Self>, rpc_url: &str, token_address: &str) -> Result<DetectionControl, ValidationError> {
        validate_rpc_url("rpcUrl", rpc_url)?;
        validate_address("tokenAddress", token_address)?;

        let control = DetectionControl {
            is_running: true,
            rpc_url: rpc_url.to_string(),
            token_address: token_address.to_string(),
            start_timestamp: Some(self.clock.now()),
        };
        if !self.shared.set(keys::DETECTION_CONTROL, &control).await {
            warn!("⚠️ Detection control not shared; only this instance will poll");
        }

        info!("🟢 Detection started for {} via {}", token_address, rpc_url);
        if self.connect(rpc_url).await.is_none() {
            warn!("⚠️ Initial RPC handshake failed, polling will keep retrying");
        }
        self.schedule().await;
        Ok(control)
    }

    /// Picks up a detection run another instance (or a previous process)
    /// left switched on.
    pub async fn resume(self: &Arc<Self>) -> bool {
        match self.control().await {
            Some(control) if control.is_running => {
                info!("🔄 Resuming detection for {}", control.token_address);
                self.schedule().await;
                true
            }
            _ => false,
        }
    }

    pub async fn stop(&self) -> Option<DetectionControl> {
        let control = self.control().await.map(|mut c| {
            c.is_running = false;
            c
        });
        if let Some(control) = &control {
            self.shared.set(keys::DETECTION_CONTROL, control).await;
        }
        self.cancel_timers();
        self.monitor.mark_disconnected();
        *self.connection.lock().await = None;
        info!("🔴 Detection stopped");
        control
    }

    /// Stops this process's timers without touching the control document.
    pub fn cancel_timers(&self) {
        let timers: Vec<CancelToken> = self.timers.lock().unwrap_or_else(|e| e.into_inner()).drain(..).collect();
        for timer in timers {
            timer.cancel();
        }
    }

    /// Re-registers running timers with the current intervals. False when
    /// this process has no timers to move.
    pub async fn reschedule(self: &Arc<Self>) -> bool {
        if !self.timers_active() {
            return false;
        }
        self.schedule().await;
        true
    }

    async fn schedule(self: &Arc<Self>) {
        self.cancel_timers();
        let (poll_every, holder_every) = {
            let settings = self.settings.read().await;
            (
                Duration::from_secs(settings.poll_interval_secs),
                Duration::from_secs(settings.holder_interval_secs),
            )
        };

        let weak: Weak<Self> = Arc::downgrade(self);
        let poll = self.scheduler.schedule(
            poll_every,
            job(move || {
                let weak = weak.clone();
                async move {
                    if let Some(service) = weak.upgrade() {
                        service.poll_tick().await;
                    }
                }
            }),
        );

        let weak: Weak<Self> = Arc::downgrade(self);
        let refresh = self.scheduler.schedule(
            holder_every,
            job(move || {
                let weak = weak.clone();
                async move {
                    if let Some(service) = weak.upgrade() {
                        service.holder_tick().await;
                    }
                }
            }),
        );

        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.push(poll);
        timers.push(refresh);
    }

    /// Reuses the live connection when the URL is unchanged, otherwise
    /// performs a fresh handshake.
    async fn connect(&self, url: &str) -> Option<Arc<dyn ChainSource>> {
        let mut connection = self.connection.lock().await;
        if let Some(existing) = connection.as_ref() {
            if existing.url == url {
                return Some(existing.source.clone());
            }
            info!("🔀 RPC url changed to {}, reconnecting", url);
        }

        match self.connector.connect(url).await {
            Ok(source) => {
                self.monitor.mark_connected(url);
                *connection = Some(Connection {
                    url: url.to_string(),
                    source: source.clone(),
                });
                Some(source)
            }
            Err(e) => {
                debug!("connect {} failed: {}", url, e);
                self.monitor.mark_failure(url);
                *connection = None;
                None
            }
        }
    }

    async fn classifier_for(&self, token_address: &str) -> Arc<Classifier> {
        let mut cached = self.classifier.lock().await;
        match cached.as_ref() {
            Some(c) if c.context().token_mint == token_address => c.clone(),
            _ => {
                let classifier = Arc::new(Classifier::new(ClassificationContext::new(
                    self.pool_address.clone(),
                    token_address,
                )));
                *cached = Some(classifier.clone());
                classifier
            }
        }
    }

    /// One polling pass. `None` when skipped: detection off, a previous tick
    /// still running, or the RPC unreachable.
    pub async fn poll_tick(&self) -> Option<TickReport> {
        if self
            .updating
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("previous poll still running, skipping tick");
            return None;
        }
        let _updating = Updating(&self.updating);

        let control = self.control().await.filter(|c| c.is_running)?;
        let source = self.connect(&control.rpc_url).await?;
        let classifier = self.classifier_for(&control.token_address).await;

        let (batch, backfill) = {
            let settings = self.settings.read().await;
            (settings.signature_batch, settings.initial_backfill)
        };

        let signatures = match self
            .poller
            .poll(source.as_ref(), &control.token_address, batch, backfill)
            .await
        {
            Ok(signatures) => signatures,
            Err(e) => {
                warn!("⚠️ Signature listing failed: {}", e);
                self.monitor.mark_failure(&control.rpc_url);
                return None;
            }
        };
        self.monitor.mark_connected(&control.rpc_url);

        let mut report = TickReport {
            fetched: signatures.len(),
            ..Default::default()
        };

        for info in signatures {
            let tx = match source.transaction(&info.signature).await {
                Ok(tx) => tx,
                Err(e) if e.is_transient() => {
                    warn!("⚠️ Fetch of {} failed, retrying next tick: {}", info.signature, e);
                    self.monitor.mark_failure(&control.rpc_url);
                    report.halted = true;
                    break;
                }
                Err(e) => {
                    error!("❌ Skipping {}: {}", info.signature, e);
                    self.processor.metrics().increment_parse_failures();
                    report.skipped += 1;
                    self.poller.advance(&control.token_address, &info.signature).await;
                    continue;
                }
            };

            // Detection may have been stopped while this tick was fetching.
            let reactions_enabled = self.is_running().await;
            match self.processor.process_transaction(&classifier, &tx, reactions_enabled).await {
                ProcessOutcome::Recorded { reaction, .. } => {
                    report.recorded += 1;
                    if reaction.is_some() {
                        report.reactions += 1;
                    }
                }
                ProcessOutcome::Duplicate => report.duplicates += 1,
            }
            self.poller.advance(&control.token_address, &info.signature).await;
        }

        if report.fetched > 0 {
            info!(
                "📊 Poll: {} new, {} recorded, {} duplicate, {} reactions",
                report.fetched, report.recorded, report.duplicates, report.reactions
            );
        }
        Some(report)
    }

    pub async fn holder_tick(&self) {
        let Some(control) = self.control().await.filter(|c| c.is_running) else {
            return;
        };
        let Some(source) = self.connect(&control.rpc_url).await else {
            return;
        };
        if let Err(e) = self.holders.fetch_top_holders(source.as_ref(), &control.token_address).await {
            warn!("⚠️ Holder refresh failed: {}", e);
        }
    }
}
