//! Per-instance persistent store: an in-process map optionally flushed to a
//! JSON file on every write. Writes are visible to readers of the same
//! handle as soon as `set_raw` returns.

use super::{KeyValueStore, StoreChange, Subscription};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

const CHANGE_BUFFER: usize = 256;

pub struct LocalStore {
    entries: Mutex<BTreeMap<String, String>>,
    path: Option<PathBuf>,
    quota_bytes: usize,
    changes: broadcast::Sender<StoreChange>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self::with_quota(None, usize::MAX)
    }

    pub fn with_quota(path: Option<PathBuf>, quota_bytes: usize) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            entries: Mutex::new(BTreeMap::new()),
            path,
            quota_bytes,
            changes,
        }
    }

    /// Opens (or creates) a file-backed store. A corrupt file is an error;
    /// a missing one starts empty.
    pub fn open(path: &Path, quota_bytes: usize) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            if text.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&text).map_err(|source| StoreError::Deserialize {
                    key: path.display().to_string(),
                    source,
                })?
            }
        } else {
            BTreeMap::new()
        };

        info!("  Local store opened: {} ({} keys)", path.display(), entries.len());

        let store = Self::with_quota(Some(path.to_path_buf()), quota_bytes);
        *store.lock() = entries;
        Ok(store)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        // A poisoned map is still a consistent map: every mutation is a
        // single insert/remove.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string(entries).map_err(|source| StoreError::Serialize {
            key: path.display().to_string(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn notify(&self, key: &str, value: Option<String>) {
        // No receivers is the normal case.
        let _ = self.changes.send(StoreChange {
            key: key.to_string(),
            value,
        });
    }
}

fn used_bytes(entries: &BTreeMap<String, String>) -> usize {
    entries.iter().map(|(k, v)| k.len() + v.len()).sum()
}

#[async_trait]
impl KeyValueStore for LocalStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        {
            let mut entries = self.lock();
            let current = entries.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let needed = used_bytes(&entries) - current + key.len() + value.len();
            if needed > self.quota_bytes {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    quota: self.quota_bytes,
                });
            }

            let previous = entries.insert(key.to_string(), value.clone());
            if let Err(e) = self.flush(&entries) {
                match previous {
                    Some(old) => entries.insert(key.to_string(), old),
                    None => entries.remove(key),
                };
                return Err(e);
            }
        }
        debug!("local set {}", key);
        self.notify(key, Some(value));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        {
            let mut entries = self.lock();
            if entries.remove(key).is_none() {
                return Ok(());
            }
            self.flush(&entries)?;
        }
        self.notify(key, None);
        Ok(())
    }

    async fn subscribe(&self, key: &str) -> Result<Subscription, StoreError> {
        let mut changes = self.changes.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let watched = key.to_string();

        let task = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(change) if change.key == watched => {
                        if tx.send(change).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("local subscription on {} lagged by {}", watched, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(key, rx, task))
    }
}
