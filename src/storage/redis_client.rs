use super::{KeyValueStore, StoreChange, Subscription};
use crate::error::StoreError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const CHANNEL_PREFIX: &str = "launch-watch:";

/// Shared store reachable by every instance. Each write is followed by a
/// publish of the new value so subscribers elsewhere learn about it; order
/// between writers is whatever order redis applied them in.
#[derive(Clone)]
pub struct RedisStore {
    client: Client,
    connection: ConnectionManager,
}

impl RedisStore {
    pub async fn new(redis_url: &str) -> Result<Self> {
        info!("  Connecting to Redis: {}", mask_redis_url(redis_url));

        let client = Client::open(redis_url)
            .context("Failed to create Redis Client")?;

        let connection = ConnectionManager::new(client.clone())
            .await
            .context("Failed to connect to Redis")?;

        info!("  Redis connected successfully");

        Ok(Self { client, connection })
    }

    async fn publish_change(&self, change: &StoreChange) {
        let payload = match serde_json::to_string(change) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("  Failed to encode change for {}: {}", change.key, e);
                return;
            }
        };

        let mut connection = self.connection.clone();
        if let Err(e) = connection
            .publish::<_, _, ()>(channel_for(&change.key), payload)
            .await
        {
            warn!("  Redis publish error: {}", e);
            if e.is_connection_dropped() || e.is_io_error() {
                warn!("  Redis connection lost, manager will reconnect on next call");
            }
        }
    }

    pub async fn ping(&self) -> Result<()> {
        let mut connection = self.connection.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut connection)
            .await
            .context("Redis PING failed")?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut connection = self.connection.clone();
        let value: Option<String> = connection.get(key).await?;
        Ok(value)
    }

    async fn set_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        connection.set::<_, _, ()>(key, &value).await?;

        self.publish_change(&StoreChange {
            key: key.to_string(),
            value: Some(value),
        })
        .await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        connection.del::<_, ()>(key).await?;

        self.publish_change(&StoreChange {
            key: key.to_string(),
            value: None,
        })
        .await;
        Ok(())
    }

    async fn subscribe(&self, key: &str) -> Result<Subscription, StoreError> {
        let channel = channel_for(key);
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;

        info!("✅ Subscribed to Redis channel: {}", channel);

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            let mut stream = pubsub.on_message();

            loop {
                match stream.next().await {
                    Some(msg) => {
                        let Ok(payload) = msg.get_payload::<String>() else {
                            continue;
                        };
                        match serde_json::from_str::<StoreChange>(&payload) {
                            Ok(change) => {
                                if tx.send(change).is_err() {
                                    break;
                                }
                            }
                            Err(e) => debug!("Skipping malformed change on {}: {}", channel, e),
                        }
                    }
                    None => {
                        error!("Redis pubsub stream ended for {}", channel);
                        break;
                    }
                }
            }
        });

        Ok(Subscription::new(key, rx, task))
    }
}

pub async fn create_redis_store(redis_url: &str) -> Result<RedisStore> {
    RedisStore::new(redis_url).await
}

fn channel_for(key: &str) -> String {
    format!("{}{}", CHANNEL_PREFIX, key)
}

pub fn mask_redis_url(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let mut masked = url.to_string();
            masked.replace_range(colon_pos + 1..at_pos, "****");
            return masked;
        }
    }
    url.to_string()
}
