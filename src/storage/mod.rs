//! Key-value adapter over the two backing stores.
//!
//! Values cross the boundary as JSON text. The typed [`Store`] facade turns
//! every storage failure into a logged no-op so that callers keep running on
//! whatever state they already hold.

pub mod local;
pub mod redis_client;

pub use local::LocalStore;
pub use redis_client::{RedisStore, create_redis_store};

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

/// Namespaced keys shared by every component.
pub mod keys {
    pub const LAUNCH_COUNTDOWN: &str = "countdown";
    pub const REWARD_COUNTDOWN: &str = "rewardCountdown";
    pub const LAUNCH_COUNTDOWN_MIRROR: &str = "countdownMirror";
    pub const REWARD_COUNTDOWN_MIRROR: &str = "rewardCountdownMirror";
    pub const DETECTION_CONTROL: &str = "detectionControl";
    pub const DETECTION_WATERMARK: &str = "detectionWatermark";
    pub const BACKEND_TRANSACTIONS: &str = "backendTransactions";
    pub const FRONTEND_TRANSACTIONS: &str = "backendTransactionsFrontend";
    pub const NOTIFICATIONS: &str = "largeTransactionNotifications";
    pub const SUCCESS_ADDRESSES: &str = "successAddresses";
    pub const HOLDER_SNAPSHOTS: &str = "holdersSnapshots";
    pub const CURRENT_HOLDERS: &str = "currentHolders";
    pub const SETTINGS: &str = "settings";

    pub const ALL: &[&str] = &[
        LAUNCH_COUNTDOWN,
        REWARD_COUNTDOWN,
        LAUNCH_COUNTDOWN_MIRROR,
        REWARD_COUNTDOWN_MIRROR,
        DETECTION_CONTROL,
        DETECTION_WATERMARK,
        BACKEND_TRANSACTIONS,
        FRONTEND_TRANSACTIONS,
        NOTIFICATIONS,
        SUCCESS_ADDRESSES,
        HOLDER_SNAPSHOTS,
        CURRENT_HOLDERS,
        SETTINGS,
    ];
}

/// A change observed on a subscribed key. `value` is `None` after a remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreChange {
    pub key: String,
    pub value: Option<String>,
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError>;

    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    async fn subscribe(&self, key: &str) -> Result<Subscription, StoreError>;
}

/// Live feed of changes to one key. Dropping it unsubscribes.
pub struct Subscription {
    key: String,
    rx: mpsc::UnboundedReceiver<StoreChange>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(
        key: &str,
        rx: mpsc::UnboundedReceiver<StoreChange>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            key: key.to_string(),
            rx,
            task: Some(task),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn recv(&mut self) -> Option<StoreChange> {
        self.rx.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Typed, fail-soft handle over a backing store.
#[derive(Clone)]
pub struct Store {
    name: &'static str,
    inner: Arc<dyn KeyValueStore>,
}

impl Store {
    pub fn new(name: &'static str, inner: Arc<dyn KeyValueStore>) -> Self {
        Self { name, inner }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Missing keys, backend errors and undecodable values all read as
    /// `None`; the latter two are logged.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!("⚠️ [{}] read of {} failed: {}", self.name, key, e);
                None
            }
        }
    }

    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.inner.get_raw(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StoreError::Deserialize {
                key: key.to_string(),
                source,
            })
    }

    /// Fire-and-forget write. Returns whether it landed so callers may count
    /// failures, but nothing needs to act on it.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match self.try_set(key, value).await {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ [{}] write of {} failed: {}", self.name, key, e);
                false
            }
        }
    }

    pub async fn try_set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string(value).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.inner.set_raw(key, json).await
    }

    pub async fn remove(&self, key: &str) -> bool {
        match self.inner.remove(key).await {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ [{}] remove of {} failed: {}", self.name, key, e);
                false
            }
        }
    }

    pub async fn subscribe(&self, key: &str) -> Result<Subscription, StoreError> {
        self.inner.subscribe(key).await
    }
}
