use anyhow::{Context, Result};
use launch_watch::{
    api,
    background::{self, CountdownTicker, DetectionService, SettingsSync, TokioScheduler},
    clock::{SharedClock, SystemClock},
    config::{self, Settings},
    countdown::CountdownEngine,
    holders::HolderSnapshotEngine,
    ledger::DualLedger,
    points::{DEFAULT_POINTS_PER_TOKEN, HttpPointsLedger, PointsLedger},
    processor::{Processor, metrics::Metrics},
    reaction::{BroadcastNotifier, ReactionEngine},
    rpc::{ConnectionMonitor, SolanaConnector},
    storage::{self, LocalStore, Store, redis_client::mask_redis_url},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, error};

#[tokio::main]
async fn main() -> Result<()> {

    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .init();

    info!("🚀 Starting launch watcher...");

    let config = config::Config::from_env()?;
    info!("✅ Configuration loaded");
    info!("   Redis: {}", mask_redis_url(&config.redis_url));
    info!("   RPC: {}", config.rpc_url);
    info!("   Token: {}", config.token_address);
    info!("   Pool: {}", config.pool_address);
    info!("   API Port: {}", config.api_port);

    let local = LocalStore::open(&config.local_store_path, config.local_store_quota_bytes)
        .context("Failed to open local store")?;
    let local = Store::new("local", Arc::new(local));

    let redis = storage::create_redis_store(&config.redis_url).await?;
    let shared = Store::new("shared", Arc::new(redis));

    let settings = Settings::load(&shared).await;
    info!("✅ Settings v{} loaded (threshold {})", settings.version, settings.large_tx_threshold);
    let rpc_timeout = Duration::from_secs(settings.rpc_timeout_secs);
    let settings = config::shared_settings(settings);

    let clock: SharedClock = Arc::new(SystemClock);
    let notifier = BroadcastNotifier::new(100);
    let metrics = Metrics::new();

    let countdown = Arc::new(CountdownEngine::new(
        shared.clone(),
        local.clone(),
        clock.clone(),
        settings.clone(),
    ));

    let reactions = Arc::new(ReactionEngine::new(
        shared.clone(),
        countdown.clone(),
        Arc::new(notifier.clone()),
        settings.clone(),
        clock.clone(),
    ));

    let holders = Arc::new(HolderSnapshotEngine::new(
        shared.clone(),
        config.pool_address.clone(),
        settings.clone(),
        clock.clone(),
    ));

    let processor = Arc::new(Processor::new(
        DualLedger::new(local.clone(), shared.clone()),
        reactions.clone(),
        settings.clone(),
        clock.clone(),
        metrics,
    ));

    let scheduler = Arc::new(TokioScheduler);

    let detection = Arc::new(DetectionService::new(
        shared.clone(),
        local.clone(),
        Arc::new(SolanaConnector { timeout: rpc_timeout }),
        scheduler.clone(),
        processor.clone(),
        holders.clone(),
        ConnectionMonitor::new(),
        settings.clone(),
        clock.clone(),
        config.pool_address.clone(),
    ));

    let settings_sync = Arc::new(SettingsSync::new(settings.clone(), detection.clone()));
    let settings_watch = settings_sync
        .clone()
        .watch(&shared)
        .await
        .context("Failed to subscribe to settings changes")?;
    info!("✅ Following shared settings");

    let points: Option<Arc<dyn PointsLedger>> = match &config.points_api_url {
        Some(url) => {
            let ledger = HttpPointsLedger::new(url, DEFAULT_POINTS_PER_TOKEN)
                .context("Failed to build points client")?;
            info!("   Points service: {}", url);
            Some(Arc::new(ledger))
        }
        None => None,
    };

    let ticker = Arc::new(CountdownTicker::new(
        countdown.clone(),
        holders.clone(),
        shared.clone(),
        config.token_address.clone(),
    ));
    let ticker_token = background::start_countdown_ticker(ticker, scheduler.as_ref());
    info!("✅ Countdown ticker started");

    if !detection.resume().await && config.auto_start_detection {
        if let Err(e) = detection.start(&config.rpc_url, &config.token_address).await {
            error!("❌ Auto-start of detection failed: {}", e);
        }
    }

    let api_state = api::AppState {
        shared: shared.clone(),
        countdown,
        detection: detection.clone(),
        processor,
        reactions,
        holders,
        notifier,
        settings,
        settings_sync,
        clock,
        points,
        default_token: config.token_address.clone(),
    };

    let router = api::create_router(api_state);
    let addr = format!("0.0.0.0:{}", config.api_port);

    info!("🌐 Starting API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let api_server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("API server error: {}", e);
        }
    });

    info!("✨ Watcher is running!");
    info!("   API: http://localhost:{}", config.api_port);
    info!("   WebSocket: ws://localhost:{}/ws/notifications", config.api_port);
    info!("Press Ctrl+C to shutdown");

    tokio::signal::ctrl_c().await?;
    info!("👋 Shutting down gracefully...");

    // Timers stop here; the shared control document keeps isRunning so the
    // next process (or another instance) resumes.
    detection.cancel_timers();
    ticker_token.cancel();
    settings_watch.abort();
    api_server.abort();

    Ok(())
}
