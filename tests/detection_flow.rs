mod common;

use chrono::Duration;
use common::{BUYER, Harness, RPC, TOKEN, swap};
use launch_watch::background::DetectionControl;
use launch_watch::classifier::{Confidence, Direction};
use launch_watch::countdown::CountdownKind;
use launch_watch::ledger::TxStatus;
use launch_watch::storage::keys;

#[tokio::test]
async fn test_large_buy_reacts_once_across_all_effects() {
    let h = Harness::new();
    h.countdown.reset(CountdownKind::Launch, Some(40)).await.unwrap();
    let mut alerts = h.notifier.subscribe();

    h.chain.push(swap("small", "1000000", "998000", "0", "2000"));
    h.chain.push(swap("whale", "3000000", "1500000", "0", "1500000"));

    h.detection.start(RPC, TOKEN).await.unwrap();
    let report = h.detection.poll_tick().await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.recorded, 2);
    assert_eq!(report.reactions, 1);
    assert!(!report.halted);

    let shared = h.processor.ledger().backend.load(100).await;
    let records = shared.list(10);
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].signature, "whale");
    assert_eq!(records[0].direction, Direction::Buy);
    assert_eq!(records[0].amount.as_deref(), Some("1500000.00"));
    assert_eq!(records[0].counterparty_address_full, BUYER);
    assert_eq!(records[0].confidence, Confidence::Primary);
    assert_eq!(records[1].amount.as_deref(), Some("2000.00"));

    let frontend = h.processor.ledger().frontend.load(100).await;
    assert_eq!(frontend.len(), 2);

    let notifications = h.reactions.notifications().list().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].transaction_ref, "whale");

    let leaderboard = h.reactions.leaderboard().list().await;
    assert_eq!(leaderboard.len(), 1);
    assert_eq!(leaderboard[0].address, BUYER);
    assert_eq!(leaderboard[0].amount, "1500000.00");

    assert_eq!(h.countdown.remaining(CountdownKind::Launch).await, Duration::seconds(70));

    let alert = alerts.try_recv().unwrap();
    assert_eq!(alert.signature, "whale");
    assert!(alerts.try_recv().is_err());

    let metrics = h.processor.metrics().get_stats();
    assert_eq!(metrics.transactions_processed, 2);
    assert_eq!(metrics.reactions_fired, 1);
}

#[tokio::test]
async fn test_repoll_with_unchanged_watermark_changes_nothing() {
    let h = Harness::new();
    h.chain.push(swap("whale", "3000000", "1500000", "0", "1500000"));
    h.detection.start(RPC, TOKEN).await.unwrap();
    h.detection.poll_tick().await.unwrap();

    let ledger_before = h.processor.ledger().backend.load(100).await.into_records();
    let notifications_before = h.reactions.notifications().list().await;
    let countdown_before = h.countdown.state(CountdownKind::Launch).await;

    let report = h.detection.poll_tick().await.unwrap();
    assert_eq!(report.fetched, 0);
    assert_eq!(report.recorded, 0);

    assert_eq!(h.processor.ledger().backend.load(100).await.into_records(), ledger_before);
    assert_eq!(h.reactions.notifications().list().await, notifications_before);
    assert_eq!(h.countdown.state(CountdownKind::Launch).await, countdown_before);
}

#[tokio::test]
async fn test_lost_watermark_refetch_is_deduplicated() {
    let h = Harness::new();
    h.chain.push(swap("whale", "3000000", "1500000", "0", "1500000"));
    h.detection.start(RPC, TOKEN).await.unwrap();
    h.detection.poll_tick().await.unwrap();

    assert!(h.local.remove(keys::DETECTION_WATERMARK).await);
    let report = h.detection.poll_tick().await.unwrap();
    assert_eq!(report.fetched, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(report.reactions, 0);

    assert_eq!(h.reactions.notifications().list().await.len(), 1);
    assert_eq!(h.processor.metrics().get_stats().duplicates_skipped, 1);
}

#[tokio::test]
async fn test_burst_beyond_one_batch_is_fully_processed() {
    let h = Harness::new();
    h.chain.push(swap("seed", "1000000", "999000", "0", "1000"));
    h.detection.start(RPC, TOKEN).await.unwrap();
    h.detection.poll_tick().await.unwrap();

    for i in 0..5 {
        h.chain.push(swap(&format!("whale-{i}"), "3000000", "1500000", "0", "1500000"));
    }
    for i in 0..25 {
        h.chain.push(swap(&format!("small-{i}"), "1000000", "999000", "0", "1000"));
    }

    let report = h.detection.poll_tick().await.unwrap();
    assert_eq!(report.fetched, 30);
    assert_eq!(report.recorded, 30);
    assert_eq!(report.reactions, 5);

    let ledger = h.processor.ledger().backend.load(100).await;
    assert_eq!(ledger.len(), 31);
    assert_eq!(ledger.list(1)[0].signature, "small-24");
    assert_eq!(h.reactions.notifications().list().await.len(), 5);

    let report = h.detection.poll_tick().await.unwrap();
    assert_eq!(report.fetched, 0);
}

#[tokio::test]
async fn test_transient_failure_halts_without_advancing() {
    let h = Harness::new();
    h.chain.list("pending");
    h.chain.push(swap("later", "1000000", "999000", "0", "1000"));

    h.detection.start(RPC, TOKEN).await.unwrap();
    let report = h.detection.poll_tick().await.unwrap();
    assert!(report.halted);
    assert_eq!(report.recorded, 0);
    assert!(h.processor.ledger().backend.load(100).await.is_empty());

    h.chain.add_transaction(swap("pending", "1000000", "999500", "0", "500"));
    let report = h.detection.poll_tick().await.unwrap();
    assert_eq!(report.fetched, 2);
    assert_eq!(report.recorded, 2);

    let ledger = h.processor.ledger().backend.load(100).await;
    assert_eq!(ledger.list(2)[0].signature, "later");
    assert_eq!(ledger.list(2)[1].signature, "pending");
}

#[tokio::test]
async fn test_failed_transaction_recorded_without_reaction() {
    let h = Harness::new();
    let mut failed = swap("reverted", "3000000", "1500000", "0", "1500000");
    failed.success = false;
    h.chain.push(failed);

    h.detection.start(RPC, TOKEN).await.unwrap();
    let report = h.detection.poll_tick().await.unwrap();
    assert_eq!(report.recorded, 1);
    assert_eq!(report.reactions, 0);

    let ledger = h.processor.ledger().backend.load(100).await;
    assert_eq!(ledger.list(1)[0].status, TxStatus::Failed);
    assert_eq!(ledger.stats().failed, 1);
    assert!(h.reactions.notifications().list().await.is_empty());
    assert!(h.reactions.leaderboard().list().await.is_empty());
}

#[tokio::test]
async fn test_scheduler_drives_polling_until_stopped() {
    let h = Harness::new();
    h.chain.push(swap("first", "1000000", "999000", "0", "1000"));

    h.detection.start(RPC, TOKEN).await.unwrap();
    assert_eq!(h.scheduler.live_count(), 2);
    assert!(h.detection.timers_active());

    h.scheduler.fire_every(std::time::Duration::from_secs(5)).await;
    assert_eq!(h.processor.ledger().backend.load(100).await.len(), 1);

    let control = h.detection.stop().await.unwrap();
    assert!(!control.is_running);
    assert_eq!(h.scheduler.live_count(), 0);

    h.chain.push(swap("second", "1000000", "999000", "0", "1000"));
    h.scheduler.fire_all().await;
    assert!(h.detection.poll_tick().await.is_none());
    assert_eq!(h.processor.ledger().backend.load(100).await.len(), 1);
}

#[tokio::test]
async fn test_tick_skipped_when_another_instance_stopped_detection() {
    let h = Harness::new();
    h.chain.push(swap("first", "1000000", "999000", "0", "1000"));
    h.detection.start(RPC, TOKEN).await.unwrap();

    let mut control: DetectionControl = h.shared.get(keys::DETECTION_CONTROL).await.unwrap();
    control.is_running = false;
    h.shared.set(keys::DETECTION_CONTROL, &control).await;

    assert!(h.detection.poll_tick().await.is_none());
    assert!(h.processor.ledger().backend.load(100).await.is_empty());
}

#[tokio::test]
async fn test_start_rejects_bad_input_and_resume_picks_up_control() {
    let h = Harness::new();
    assert!(h.detection.start("ftp://nope", TOKEN).await.is_err());
    assert!(h.detection.start(RPC, "not-an-address").await.is_err());
    assert!(h.detection.control().await.is_none());
    assert!(!h.detection.resume().await);

    h.detection.start(RPC, TOKEN).await.unwrap();
    h.detection.cancel_timers();
    assert_eq!(h.scheduler.live_count(), 0);

    // A restarted process finds isRunning still set and schedules again.
    assert!(h.detection.resume().await);
    assert_eq!(h.scheduler.live_count(), 2);
}
