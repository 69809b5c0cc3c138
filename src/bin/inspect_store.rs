use anyhow::{Result, Context};
use launch_watch::background::DetectionControl;
use launch_watch::countdown::{CountdownKind, CountdownState};
use launch_watch::holders::{CurrentHolders, HolderSnapshot};
use launch_watch::ledger::{Ledger, TransactionRecord};
use launch_watch::reaction::{LeaderboardEntry, NotificationRecord};
use launch_watch::rpc::poller::Watermark;
use launch_watch::storage::{self, Store, keys, redis_client::mask_redis_url};
use serde_json::Value;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let redis_url = std::env::var("REDIS_URL")
        .unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let redis = storage::create_redis_store(&redis_url)
        .await
        .context("Failed to connect to shared store")?;
    let store = Store::new("shared", Arc::new(redis));

    println!("🔍 Inspecting shared store at {}\n", mask_redis_url(&redis_url));

    let now = chrono::Utc::now();
    for kind in CountdownKind::ALL {
        match store.get::<CountdownState>(kind.key()).await {
            Some(state) => {
                println!("⏱️  {} countdown:", kind);
                println!("   Target: {}", state.target_timestamp);
                println!("   Remaining: {}s", state.remaining(now).num_seconds());
                println!("   Cap reached: {}", state.cap_reached_flag);
            }
            None => println!("⏱️  {} countdown: not set", kind),
        }
    }

    match store.get::<DetectionControl>(keys::DETECTION_CONTROL).await {
        Some(control) => {
            println!("\n📡 Detection:");
            println!("   Running: {}", control.is_running);
            println!("   RPC: {}", control.rpc_url);
            println!("   Token: {}", control.token_address);
            println!(
                "   Started: {}",
                control.start_timestamp.map(|t| t.to_string()).unwrap_or_else(|| "N/A".to_string())
            );
        }
        None => println!("\n📡 Detection: never started"),
    }

    if let Some(watermark) = store.get::<Watermark>(keys::DETECTION_WATERMARK).await {
        println!("   Watermark: {} ({})", watermark.signature, watermark.address);
    }

    let records = store
        .get::<Vec<TransactionRecord>>(keys::BACKEND_TRANSACTIONS)
        .await
        .unwrap_or_default();
    let ledger = Ledger::from_records(records, usize::MAX);
    let stats = ledger.stats();
    println!("\n📝 Shared ledger: {} records", ledger.len());
    println!("   Buys: {}  Sells: {}  Transfers: {}  Unknown: {}  Failed: {}",
             stats.buys, stats.sells, stats.transfers, stats.unknown, stats.failed);
    println!("   Buy volume: {}  Sell volume: {}", stats.buy_volume, stats.sell_volume);
    if let Some(latest) = ledger.list(1).first() {
        println!("   Latest: {} {:?} {}", latest.signature, latest.direction,
                 latest.amount.as_deref().unwrap_or("-"));
    }

    let notifications = store
        .get::<Vec<NotificationRecord>>(keys::NOTIFICATIONS)
        .await
        .unwrap_or_default();
    println!("\n🔔 Notifications: {}", notifications.len());
    if let Some(latest) = notifications.first() {
        println!("   Latest: {}", latest.message);
    }

    let leaderboard = store
        .get::<Vec<LeaderboardEntry>>(keys::SUCCESS_ADDRESSES)
        .await
        .unwrap_or_default();
    println!("\n🏆 Leaderboard:");
    for (i, entry) in leaderboard.iter().enumerate() {
        println!("   {}. {} {}", i + 1, entry.address, entry.amount);
    }

    let snapshots = store
        .get::<Vec<HolderSnapshot>>(keys::HOLDER_SNAPSHOTS)
        .await
        .unwrap_or_default();
    println!("\n📸 Holder snapshots: {}", snapshots.len());
    if let Some(latest) = snapshots.last() {
        println!("   Latest: {} ({} holders)", latest.snapshot_id, latest.holders.len());
    }

    if let Some(current) = store.get::<CurrentHolders>(keys::CURRENT_HOLDERS).await {
        println!("   Current ranking: {} holders, updated {}", current.holders.len(), current.updated_at);
    }

    match store.get::<Value>(keys::SETTINGS).await {
        Some(settings) => println!("\n⚙️  Settings:\n{}", serde_json::to_string_pretty(&settings)?),
        None => println!("\n⚙️  Settings: defaults"),
    }

    Ok(())
}
