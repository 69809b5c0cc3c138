//! Keeps this process's settings in step with the shared settings document.
//!
//! Any instance may patch the document; every instance reloads it from the
//! change feed and restarts its detection timers when an interval moved.

use super::DetectionService;
use crate::config::{Settings, SharedSettings};
use crate::error::{StoreError, ValidationError};
use crate::storage::{Store, keys};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct SettingsSync {
    settings: SharedSettings,
    detection: Arc<DetectionService>,
}

impl SettingsSync {
    pub fn new(settings: SharedSettings, detection: Arc<DetectionService>) -> Self {
        Self { settings, detection }
    }

    /// Swaps `updated` in. Returns false when nothing changed.
    pub async fn apply(&self, updated: Settings) -> bool {
        let previous = {
            let mut current = self.settings.write().await;
            if *current == updated {
                return false;
            }
            std::mem::replace(&mut *current, updated.clone())
        };

        let intervals_moved = previous.poll_interval_secs != updated.poll_interval_secs
            || previous.holder_interval_secs != updated.holder_interval_secs;
        if intervals_moved && self.detection.reschedule().await {
            info!(
                "⏱️ Detection timers rescheduled: poll every {}s, holders every {}s",
                updated.poll_interval_secs, updated.holder_interval_secs
            );
        }
        true
    }

    /// Follows `settings` in the shared store until the subscription ends.
    pub async fn watch(self: Arc<Self>, shared: &Store) -> Result<JoinHandle<()>, StoreError> {
        let mut subscription = shared.subscribe(keys::SETTINGS).await?;

        Ok(tokio::spawn(async move {
            while let Some(change) = subscription.recv().await {
                let Some(raw) = change.value else {
                    debug!("settings removed from shared store, keeping current values");
                    continue;
                };
                match parse(&raw) {
                    Ok(settings) => {
                        if self.apply(settings).await {
                            info!("⚙️ Settings reloaded from shared store");
                        }
                    }
                    Err(e) => warn!("⚠️ Ignoring shared settings update: {}", e),
                }
            }
            debug!("settings subscription closed");
        }))
    }
}

fn parse(raw: &str) -> Result<Settings, ValidationError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| ValidationError::Malformed(e.to_string()))?;
    Settings::migrate(value)
}
